pub mod catalog;
pub mod chart;
pub mod cli;
pub mod error;
pub mod pipeline;
pub mod web;
