pub mod filters;
pub mod run;
