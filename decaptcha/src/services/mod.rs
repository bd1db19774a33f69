mod solver;

pub use solver::{decode_captcha, SolverService};
