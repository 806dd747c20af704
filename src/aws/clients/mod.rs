pub mod beanstalk;
pub mod cloudformation;
pub mod opsworks;
pub mod s3;
pub mod traits;
