//! Registry events

use crate::options::DiscoveryOptions;
use crate::record::Record;

/// Event emitted by a registry to its subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A record was published
    Published(Record),

    /// A record was unpublished
    Unpublished(Record),

    /// A record was replaced
    Updated(Record),

    /// A new service reference was created
    Bound { registration: String, reference: u64 },

    /// A service reference was released
    Released { registration: String, reference: u64 },
}

impl DiscoveryEvent {
    /// Address the event belongs to: announce for record lifecycle, usage
    /// for reference lifecycle.
    pub fn address<'a>(&self, options: &'a DiscoveryOptions) -> &'a str {
        match self {
            Self::Published(_) | Self::Unpublished(_) | Self::Updated(_) => &options.announce_address,
            Self::Bound { .. } | Self::Released { .. } => &options.usage_address,
        }
    }

    /// Registration id of the record the event concerns.
    pub fn registration(&self) -> Option<&str> {
        match self {
            Self::Published(record) | Self::Unpublished(record) | Self::Updated(record) => {
                record.registration()
            }
            Self::Bound { registration, .. } | Self::Released { registration, .. } => {
                Some(registration)
            }
        }
    }
}
