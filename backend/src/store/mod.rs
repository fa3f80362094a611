//! Persistence handles injected into the booking service.
//!
//! Two-entity writes (claiming a property while inserting its booking, and
//! releasing it while cancelling) are single trait calls so that each backend can
//! make them atomic. Writes that depend on a status read earlier re-check that
//! status at write time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Property, PropertyChangeset, PropertyStatus, TokenBooking};

mod memory;

pub use memory::MemoryStore;

/// Result of [`BookingStore::cancel_reservation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Cancellation {
    pub booking: TokenBooking,
    /// Whether the property was put back on the market. Only a booking that was
    /// still pending or confirmed at write time holds its property.
    pub released: bool,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_property(&self, property: Property) -> Result<Property, StoreError>;

    async fn find_property(&self, id: Uuid) -> Result<Option<Property>, StoreError>;

    /// Writes the supplied columns of property `id` and returns the stored row.
    /// With `expected_status` set, the write only happens while the property
    /// still has that status. `None` when nothing matched.
    async fn update_property_fields(
        &self,
        id: Uuid,
        changes: PropertyChangeset,
        expected_status: Option<PropertyStatus>,
    ) -> Result<Option<Property>, StoreError>;

    /// Flips the booking's property from `available` to `token_booked` and inserts
    /// the booking, as one unit. Returns `None` when the property was no longer
    /// available, in which case nothing is written.
    async fn insert_reservation_claiming(
        &self,
        booking: TokenBooking,
    ) -> Result<Option<TokenBooking>, StoreError>;

    async fn find_reservation(&self, id: Uuid) -> Result<Option<TokenBooking>, StoreError>;

    /// Bookings where `user_id` is buyer or seller, newest first.
    async fn list_reservations_for_user(&self, user_id: &str)
        -> Result<Vec<TokenBooking>, StoreError>;

    async fn update_reservation(&self, booking: &TokenBooking) -> Result<(), StoreError>;

    /// Marks booking `id` cancelled and, if it was still active, sets its
    /// property back to `available`, as one unit. With `require_active`, an
    /// inactive booking is returned untouched. `None` when the booking is gone.
    async fn cancel_reservation(
        &self,
        id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
        require_active: bool,
    ) -> Result<Option<Cancellation>, StoreError>;

    /// Pending bookings whose validity window closed before `now`.
    async fn list_expired_pending(&self, now: DateTime<Utc>)
        -> Result<Vec<TokenBooking>, StoreError>;

    /// Cancels booking `id` as expired and releases its property, but only if it
    /// is still pending with a validity window closed before `now`. Returns
    /// whether anything was written.
    async fn expire_if_still_pending(&self, id: Uuid, now: DateTime<Utc>)
        -> Result<bool, StoreError>;
}
