//! Registry bundle shared by the switch components.

use crate::client::Point;
use crate::core::{ACCOUNT_CAPACITY, NEIGHBOR_CAPACITY, ONLINE_CAPACITY, POINT_CAPACITY};
use crate::registry::{Neighbor, Network, OnlineLine, Store, User};

/// Every registry of one switch instance.
///
/// Built once and shared by reference, usually behind an `Arc`.
pub struct Registry {
    /// Accounts, keyed `user@network`.
    pub users: Store<User>,
    /// Address pools, keyed by network name.
    pub networks: Store<Network>,
    /// Learned neighbors, keyed by IP.
    pub neighbors: Store<Neighbor>,
    /// Points connected to this switch, keyed by address.
    pub points: Store<Point>,
    /// Outbound links of this switch, keyed by address.
    pub links: Store<Point>,
    /// Observed flows.
    pub online: Store<OnlineLine>,
}

impl Registry {
    /// Create a bundle with the default capacities.
    pub fn new() -> Self {
        Self {
            users: Store::new(ACCOUNT_CAPACITY),
            networks: Store::new(0),
            neighbors: Store::new(NEIGHBOR_CAPACITY),
            points: Store::new(POINT_CAPACITY),
            links: Store::new(POINT_CAPACITY),
            online: Store::new(ONLINE_CAPACITY),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
