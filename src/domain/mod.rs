//! 预订领域层：数据模型与外部协作者接口

pub mod model;
pub mod repository;
