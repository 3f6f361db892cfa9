//! Named distributed locks and FIFO work queues.
//!
//! Both services are defined as traits so the coordinator never assumes a
//! particular backing store; the in-memory implementations here are the
//! single-instance deployment. The interface is the contract.
//!
//! ## Core Types
//!
//! - [`LockService`] / [`MemoryLocks`] — named mutexes with blocking acquire
//!   and timeout, released on guard drop
//! - [`LockName`] / [`LockClass`] — lock identity plus the global acquisition
//!   order (player before content before phase before party)
//! - [`QueueService`] / [`MemoryQueues`] — named multi-producer FIFO queues
//!   with push/peek/pop/remove
mod lock;
mod queue;

pub use lock::*;
pub use queue::*;
