//! Structural identifiers.
//!
//! Every rendered element gets a SID computed from its parent's SID, its
//! *source* path segment (or explicit marker), and — for immediate children
//! of an iteration expansion — the stringified row marker. Keying off source
//! position is what keeps a sibling's SID stable when a conditional branch
//! flips or an iteration changes row count.

use rustc_hash::FxHasher;
use std::hash::Hasher;
use std::rc::Rc;

pub type Sid = Rc<str>;

/// SID of a declarative root: no parent, keyed by the root's id (or its
/// document position when no id is authored).
pub fn root_sid(root_key: &str) -> Sid {
    compute("", root_key, None)
}

pub fn child_sid(parent: &Sid, segment: &str, iteration_key: Option<&str>) -> Sid {
    compute(parent, segment, iteration_key)
}

fn compute(parent: &str, segment: &str, iteration_key: Option<&str>) -> Sid {
    let mut hasher = FxHasher::default();
    hasher.write(parent.as_bytes());
    hasher.write_u8(0xff);
    hasher.write(segment.as_bytes());
    hasher.write_u8(0xff);
    if let Some(key) = iteration_key {
        hasher.write(key.as_bytes());
    }
    format!("{:016x}", hasher.finish()).into()
}
