//! # 纵向空间索引模块
//!
//! 把每个实例的DICOM几何标签转换为可查询的切片平面索引，并回答
//! "某个三维解剖点在不同时间的各次检查中落在哪一张切片上"。

pub mod geometry;
pub mod indexer;
pub mod orientation;
pub mod resolver;

pub use geometry::{build_indexed_slices, Vec3};
pub use indexer::LongitudinalIndexer;
pub use orientation::{filter_by_series, orientation_fingerprint};
pub use resolver::{nearest_slice, resolve_in_study};
