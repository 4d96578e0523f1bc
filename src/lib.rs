pub mod config;
pub mod exercise;
pub mod fall;
pub mod geometry;
pub mod notify;
pub mod pose;
pub mod roi;
pub mod session;
pub mod smooth;
pub mod workout;

#[cfg(test)]
pub(crate) mod testutil;
