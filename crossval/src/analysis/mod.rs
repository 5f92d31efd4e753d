pub mod matrix_score;
pub mod plot;
pub mod robustness;
