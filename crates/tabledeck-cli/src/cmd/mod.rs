pub mod actions;
pub mod init;
pub mod load;
pub mod run;
pub mod show;
pub mod status;
