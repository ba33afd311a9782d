//! linkqueue: lock-free MPMC FIFO queues built from segment-linking proxies
//!
//! A queue here is two orthogonal layers: a fixed-capacity lock-free ring
//! *segment* ([`segment`]) and a *proxy* ([`proxy`]) that links segments into
//! a chain to form a larger, optionally bounded queue, with memory
//! reclamation handled either by hazard pointers ([`hazard`]) or an
//! epoch-based recycler ([`recycler`]).
//!
//! # Example
//!
//! ```
//! use linkqueue_rs::{CapacityPolicy, HazardProxy};
//! use linkqueue_rs::segment::sequenced::SequencedSegment;
//!
//! let proxy: HazardProxy<u64, SequencedSegment<u64>> =
//!     HazardProxy::new(1024, 16, CapacityPolicy::Unbounded).unwrap();
//! let ticket = proxy.acquire().unwrap();
//! proxy.enqueue(ticket, 42);
//! assert_eq!(proxy.dequeue(ticket), Some(42));
//! proxy.release();
//! ```
//!
//! Three capacity policies share one pointer-linked hazard-protected
//! traversal ([`proxy::hazard_linked::HazardProxy`]): unbounded, a bound on
//! the number of linked segments, and a bound on the total item count. A
//! fourth variant ([`proxy::memory_bounded::MemoryBoundedProxy`]) bounds
//! capacity implicitly, by drawing segments from a fixed recyclable pool
//! instead of allocating and freeing them individually.

mod backoff;
mod bucket;
mod config;
mod epoch;
mod hazard;
mod invariants;
mod metrics;
mod recycler;
mod ticket;
mod versioned_index;

pub mod proxy;
pub mod segment;

pub use backoff::Backoff;
pub use config::{Config, HIGH_THROUGHPUT_CONFIG, LOW_LATENCY_CONFIG};
pub use epoch::{EpochCell, EpochSnapshot};
pub use hazard::HazardArray;
pub use metrics::{Metrics, MetricsSnapshot};
pub use proxy::hazard_linked::HazardProxy;
pub use proxy::memory_bounded::MemoryBoundedProxy;
pub use proxy::{CapacityPolicy, ProxyError};
pub use recycler::EpochRecycler;
pub use ticket::TicketAllocator;
pub use versioned_index::VersionedIndex;
