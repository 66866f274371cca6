//! Data structures for ambient contribution estimation.

mod ambient_profile;
mod count_matrix;

pub use ambient_profile::AmbientProfile;
pub use count_matrix::CountMatrix;
