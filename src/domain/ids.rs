//! Opaque stable identifiers for every entity in §3.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

opaque_id!(TenantId);
opaque_id!(ClientId);
opaque_id!(CreditReportId);
opaque_id!(DisputeItemId);
opaque_id!(LetterId);
opaque_id!(LetterBatchId);
opaque_id!(DeadlineId);
opaque_id!(TaskId);
opaque_id!(ScheduleId);
opaque_id!(TriggerId);
opaque_id!(PaymentId);
opaque_id!(AuditLogId);
