//! Storage family tags, the sentinel strings a backend descriptor's
//! `storage` field carries.
//!
//! These are the values carried in a backend descriptor's `storage` field
//! and used as keys into [`crate::registry::PluginRegistry`].

/// Block SAN (FC/iSCSI/NVMe-oF LUNs) on the flagship array.
pub const OCEANSTOR_SAN: &str = "oceanstor-san";
/// File NAS (NFS/DPC filesystems) on the flagship array.
pub const OCEANSTOR_NAS: &str = "oceanstor-nas";
/// Directory-tree pseudo-volumes on the flagship array.
pub const OCEANSTOR_DTREE: &str = "oceanstor-dtree";
/// The distributed/scale-out file family.
pub const OCEANSTOR_9000: &str = "oceanstor-9000";
/// Block SAN on the fusion/distributed array.
pub const FUSIONSTORAGE_SAN: &str = "fusionstorage-san";
/// File NAS on the fusion/distributed array.
pub const FUSIONSTORAGE_NAS: &str = "fusionstorage-nas";
/// Directory-tree pseudo-volumes on the fusion/distributed array.
pub const FUSIONSTORAGE_DTREE: &str = "fusionstorage-dtree";
/// File NAS on the A-series flagship array — same NFS/DPC protocol surface
/// as `oceanstor-nas`, distinct family tag because the A-series controller
/// reports its own capability/QoS set.
pub const OCEANSTOR_NAS_ASERIES: &str = "oceanstor-nas-a";

/// All family tags recognized out of the box, for registries that want to
/// assert every family has been registered.
pub const ALL: &[&str] = &[
    OCEANSTOR_SAN,
    OCEANSTOR_NAS,
    OCEANSTOR_DTREE,
    OCEANSTOR_9000,
    FUSIONSTORAGE_SAN,
    FUSIONSTORAGE_NAS,
    FUSIONSTORAGE_DTREE,
    OCEANSTOR_NAS_ASERIES,
];

/// Families whose volumes are SAN-style LUNs (`volumeType` filter `"lun"`).
#[must_use]
pub fn is_san(family: &str) -> bool {
    matches!(family, OCEANSTOR_SAN | FUSIONSTORAGE_SAN)
}

/// Families whose volumes are NAS-style filesystems (`volumeType` filter
/// `"fs"`), including the distributed file family and the A-series NAS
/// variant.
#[must_use]
pub fn is_nas(family: &str) -> bool {
    matches!(family, OCEANSTOR_NAS | FUSIONSTORAGE_NAS | OCEANSTOR_9000 | OCEANSTOR_NAS_ASERIES)
}

/// Directory-tree pseudo-volume families (`volumeType` filter `"dtree"`).
#[must_use]
pub fn is_dtree(family: &str) -> bool {
    matches!(family, OCEANSTOR_DTREE | FUSIONSTORAGE_DTREE)
}

/// Families that synthesize a single self-named pool rather than reading a
/// `pools` parameter (directory-tree families).
#[must_use]
pub fn is_single_pool_family(family: &str) -> bool {
    is_dtree(family)
}

/// The distributed file family is accepted unconditionally by the
/// `allocType` filter regardless of thin/thick capability flags.
#[must_use]
pub fn ignores_alloc_type(family: &str) -> bool {
    family == OCEANSTOR_9000
}
