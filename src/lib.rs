// Missing-value imputation for omics matrices

#![doc = include_str!("../README.md")]

pub mod element;
pub mod error;
pub mod knn;
pub mod linalg_backends;
pub mod mask;
pub mod minprob;
pub mod orientation;
pub mod qrilc;
pub mod spatial;
pub mod stats;
pub mod substitute;
pub mod summary;
pub mod svd;
pub mod tabular;
pub mod transform;


pub use element::Element;
pub use error::{DegenerateSpreadPolicy, ImputationError, Result, ThreadSafeStdError};
pub use knn::{impute_knn, impute_knn_inplace, impute_knn_with_report, KnnConfig, KnnReport};
pub use mask::{count_missing, has_missing, missing_mask};
pub use minprob::{
    impute_minprob, impute_minprob_inplace, impute_minprob_inplace_with_rng, impute_minprob_with_rng, MinProbConfig,
};
pub use orientation::SampleAxis;
pub use qrilc::{impute_qrilc, impute_qrilc_inplace, impute_qrilc_inplace_with_rng, impute_qrilc_with_rng, QrilcConfig};
pub use spatial::DistanceMetric;
pub use substitute::{
    impute_half_min, impute_half_min_inplace, impute_median_cat, impute_median_cat_inplace, impute_min,
    impute_min_inplace, impute_zero, impute_zero_inplace, substitute, substitute_inplace,
};
pub use summary::MissingnessSummary;
pub use svd::{impute_svd, impute_svd_inplace, impute_svd_with_report, SvdConfig, SvdReport};
pub use tabular::{impute_columns, Column, ColumnValues, Table, Tabular};
pub use transform::{
    huberize, huberize_inplace, log_transform, log_transform_inplace, mean_center, mean_center_inplace,
    normalize_by_sum, normalize_by_sum_inplace, HuberConfig,
};
