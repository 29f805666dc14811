//! Gateway module - Key pool state, load balancing, retries and batching

pub mod batch;
pub mod key_record;
pub mod load_balancer;
pub mod retry;
