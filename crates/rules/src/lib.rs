pub mod alert;
pub mod cli;
pub mod config;
pub mod duration;
pub mod error;
pub mod labels;
pub mod maintenance;
pub mod manager;
pub mod notify;
pub mod querier;
pub mod rule;
pub mod run;
pub mod series;
pub mod shutdown;
pub mod store;
pub mod task;
pub mod template;
pub mod threshold;
pub mod units;
