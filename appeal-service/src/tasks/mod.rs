pub mod appeal_generation;
pub mod extraction;

pub use appeal_generation::generate_appeal;
pub use extraction::extract;
