pub mod expansion;
pub mod optimizer;
pub mod planning;
pub mod scheduler;
