//! Model governance: the active-model pointer and the promotion governor
//! that is its only writer.

pub mod governor;
pub mod pointer;

pub use governor::{
    CandidateEvaluation, CandidateModel, CandidateStatus, ModelRegistry, PromotionDecision,
    PromotionGovernor, PromotionReport, StoreRegistry,
};
pub use pointer::{ActiveModelPointer, PointerStore, PromotionRecord};
