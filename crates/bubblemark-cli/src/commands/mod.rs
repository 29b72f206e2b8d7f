pub mod batch;
pub mod compare;
pub mod evaluate;
pub mod init;
pub mod review;
pub mod template;
pub mod validate;
