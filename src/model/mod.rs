//! Domain rows for the yard: staging entries, inventory records, bookings, and registries.

pub mod booking;
pub mod container;
pub mod inventory;
pub mod registry;
pub mod staging;

pub use booking::{BookingAllocation, BookingUnit, Consumed, NewBooking};
pub use container::{Condition, ContainerNo, Direction, SizeClass};
pub use inventory::{CheckerDetail, InventoryRecord, NewInventoryRecord};
pub use registry::{BanEntry, Client, HoldEntry, YardUser};
pub use staging::{
    GateInDetail, NewStagingEntry, Page, RuntimeBand, StagingDraft, StagingEntry, StagingListRow,
    StagingQuery, StagingStatus, StagingView,
};
