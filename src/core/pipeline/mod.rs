pub mod locating;
pub mod submission;
pub mod validating;
