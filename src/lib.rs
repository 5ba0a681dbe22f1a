pub mod api;
pub mod calendar;
pub mod config;
pub mod data;
pub mod deadline;
pub mod error;
pub mod evaluation;
pub mod future;
pub mod linear;
pub mod logging;
pub mod model;
pub mod neural;
pub mod pipeline;
pub mod prep;
pub mod runtime;
pub mod server;
pub mod service;
pub mod session;
pub mod stationarity;
pub mod stats;
