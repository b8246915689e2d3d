//! Consolidated cross-module tests.
//!
//! End-to-end flows through the service façade: staleness bounds,
//! concurrent access during rebuilds, and multi-role entitlement.
