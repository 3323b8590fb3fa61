//! Identifier generation.
//!
//! IDs are globally unique and collision-resistant without coordination
//! (§4.5). The format embeds tier, scope, and creation time for
//! debuggability, but callers must never parse it for semantics — treat it
//! as opaque.

use chrono::Utc;
use uuid::Uuid;

use crate::memory::{Scope, Tier};

pub fn generate(tier: Tier, scope: Scope) -> String {
    format!(
        "{}-{}-{}-{}",
        tier.as_str(),
        scope.as_str(),
        Utc::now().timestamp_millis(),
        Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct() {
        let a = generate(Tier::Core, Scope::Global);
        let b = generate(Tier::Core, Scope::Global);
        assert_ne!(a, b);
    }

    #[test]
    fn id_carries_tier_and_scope_prefix() {
        let id = generate(Tier::Longterm, Scope::Project);
        assert!(id.starts_with("longterm-project-"));
    }
}
