//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

use taleforge_core::package::PackageStatus as DomainPackageStatus;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Creative pipeline status of a package.
    PackageStatus {
        Draft = 1,
        Processing = 2,
        Completed = 3,
        Failed = 4,
    }
}

impl From<DomainPackageStatus> for PackageStatus {
    fn from(value: DomainPackageStatus) -> Self {
        match value {
            DomainPackageStatus::Draft => Self::Draft,
            DomainPackageStatus::Processing => Self::Processing,
            DomainPackageStatus::Completed => Self::Completed,
            DomainPackageStatus::Failed => Self::Failed,
        }
    }
}

impl From<PackageStatus> for DomainPackageStatus {
    fn from(value: PackageStatus) -> Self {
        match value {
            PackageStatus::Draft => Self::Draft,
            PackageStatus::Processing => Self::Processing,
            PackageStatus::Completed => Self::Completed,
            PackageStatus::Failed => Self::Failed,
        }
    }
}
