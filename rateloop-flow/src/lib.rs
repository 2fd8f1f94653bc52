//! Flow control and rate feedback for rateloop.
//!
//! This crate provides the synchronization core shared by the producer,
//! consumer and controller roles:
//!
//! - **Bounded queue**: fixed-capacity FIFO ring buffer.
//! - **Flow controller**: one mutex plus "items" and "slots" semaphores
//!   implementing the bounded-buffer protocol.
//! - **Feedback controller**: threshold-tracking adjustment of the production
//!   delay with pluggable decrease policies.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        FlowController                         │
//! │                                                               │
//! │  producer ──slots──▶ ┌─────────────────────────┐ ──items──▶   │
//! │                      │ Mutex<SharedState>      │   consumer   │
//! │                      │  BoundedQueue, delay    │              │
//! │                      └─────────────────────────┘              │
//! │                                  ▲                            │
//! │                                  │ lock                       │
//! │                        FeedbackController                     │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use rateloop_flow::{FeedbackConfig, FeedbackController, FlowController};
//!
//! # tokio_test_block_on(async {
//! let flow = FlowController::new(10, 2.0).unwrap();
//! flow.insert("hello").await.unwrap();
//!
//! let mut feedback = FeedbackController::new(FeedbackConfig::new(5)).unwrap();
//! let update = feedback.apply(&mut *flow.lock().await);
//! assert!(update.current_secs < 2.0);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod controller;
pub mod error;
pub mod feedback;
pub mod queue;

// Re-export main types for convenience.
pub use controller::{FlowController, InsertGuard, RemoveGuard, SharedState};
pub use error::{FlowError, FlowResult};
pub use feedback::{
    Adjustment, DelayPolicy, DelayUpdate, FeedbackConfig, FeedbackController, FeedbackStats,
};
pub use queue::{BoundedQueue, QueueStats};
