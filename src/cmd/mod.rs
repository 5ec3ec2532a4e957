pub mod calendar;
pub mod mirror;
pub mod offboard;
pub mod progress;
pub mod session;
pub mod tenant;
