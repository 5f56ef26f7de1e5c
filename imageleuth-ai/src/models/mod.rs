//! Data models for imageleuth-ai (receipt recognition service)
//!
//! - Canonical expense record and its enumerations
//! - Tagged recognition responses and per-item failure kinds
//! - Batch session lifecycle and detail (audit) entries

pub mod batch_session;
pub mod detail_entry;
pub mod expense_record;
pub mod recognition;

pub use batch_session::{BatchSession, BatchStatus, BatchTotals, SessionClosing};
pub use detail_entry::DetailEntry;
pub use expense_record::{
    is_reserved_header, ExpenseCategory, ExpenseRecord, PaymentChannel, RecognitionStatus,
    CANONICAL_COLUMNS, DEFAULT_EXPENSE_DATE, ERROR_HEADER, STATUS_HEADER,
};
pub use recognition::{RecognitionFailure, RecognitionResponse, SourceFields};
