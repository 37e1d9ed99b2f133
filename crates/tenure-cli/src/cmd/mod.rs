pub mod check;
pub mod init;
pub mod probe;
pub mod resolve;
pub mod run;
