pub mod alignment;
pub mod banded;
pub mod gap_filler;
pub mod mapping_quality;
