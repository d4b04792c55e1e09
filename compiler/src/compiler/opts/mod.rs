pub mod strength_reduction;
