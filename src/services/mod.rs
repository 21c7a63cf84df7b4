pub mod aggregator;
pub mod coordinator;
pub mod fetcher;
pub mod policy;
pub mod report;
pub mod scheduler;
pub mod weatherapi;
pub mod writer;
