use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BookingStore, Cancellation};
use crate::error::StoreError;
use crate::models::{
    Property, PropertyChangeset, PropertyStatus, ReservationStatus, TokenBooking, EXPIRED_REASON,
};

#[derive(Default)]
struct Tables {
    properties: HashMap<Uuid, Property>,
    bookings: HashMap<Uuid, TokenBooking>,
}

/// Process-local store. A single lock covers both tables, so the two-entity
/// operations are atomic with respect to each other.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_property(&self, property: Property) -> Result<Property, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.properties.insert(property.id, property.clone());
        Ok(property)
    }

    async fn find_property(&self, id: Uuid) -> Result<Option<Property>, StoreError> {
        Ok(self.tables.lock().await.properties.get(&id).cloned())
    }

    async fn update_property_fields(
        &self,
        id: Uuid,
        changes: PropertyChangeset,
        expected_status: Option<PropertyStatus>,
    ) -> Result<Option<Property>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(property) = tables.properties.get_mut(&id) else {
            return Ok(None);
        };
        if expected_status.is_some_and(|expected| expected != property.status) {
            return Ok(None);
        }
        changes.apply_to(property);
        Ok(Some(property.clone()))
    }

    async fn insert_reservation_claiming(
        &self,
        booking: TokenBooking,
    ) -> Result<Option<TokenBooking>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(property) = tables.properties.get_mut(&booking.property_id) else {
            return Ok(None);
        };
        if property.status != PropertyStatus::Available {
            return Ok(None);
        }
        property.status = PropertyStatus::TokenBooked;
        property.updated_at = booking.created_at;
        tables.bookings.insert(booking.id, booking.clone());
        Ok(Some(booking))
    }

    async fn find_reservation(&self, id: Uuid) -> Result<Option<TokenBooking>, StoreError> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn list_reservations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<TokenBooking>, StoreError> {
        let tables = self.tables.lock().await;
        let mut found: Vec<TokenBooking> = tables
            .bookings
            .values()
            .filter(|b| b.is_participant(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn update_reservation(&self, booking: &TokenBooking) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.bookings.get_mut(&booking.id) {
            *existing = booking.clone();
        }
        Ok(())
    }

    async fn cancel_reservation(
        &self,
        id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
        require_active: bool,
    ) -> Result<Option<Cancellation>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(booking) = tables.bookings.get_mut(&id) else {
            return Ok(None);
        };
        let was_active = booking.status.is_active();
        if require_active && !was_active {
            return Ok(Some(Cancellation {
                booking: booking.clone(),
                released: false,
            }));
        }

        booking.status = ReservationStatus::Cancelled;
        booking.cancellation_reason = reason;
        booking.updated_at = now;
        let booking = booking.clone();
        if was_active {
            release(&mut tables, booking.property_id, now);
        }
        Ok(Some(Cancellation {
            booking,
            released: was_active,
        }))
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TokenBooking>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| is_lapsed(b, now))
            .cloned()
            .collect())
    }

    async fn expire_if_still_pending(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(booking) = tables.bookings.get_mut(&id).filter(|b| is_lapsed(b, now)) else {
            return Ok(false);
        };
        booking.status = ReservationStatus::Cancelled;
        booking.cancellation_reason = Some(EXPIRED_REASON.to_string());
        booking.updated_at = now;
        let property_id = booking.property_id;
        release(&mut tables, property_id, now);
        Ok(true)
    }
}

fn is_lapsed(booking: &TokenBooking, now: DateTime<Utc>) -> bool {
    booking.status == ReservationStatus::Pending && booking.valid_until < now
}

fn release(tables: &mut Tables, property_id: Uuid, now: DateTime<Utc>) {
    if let Some(property) = tables.properties.get_mut(&property_id) {
        property.status = PropertyStatus::Available;
        property.updated_at = now;
    }
}
