pub mod environment;
pub mod remote;
pub mod run;
pub mod validate;
