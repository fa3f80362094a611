use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use log::{error, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{
    Property, PropertyChangeset, PropertyStatus, ReservationStatus, TokenBooking, EXPIRED_REASON,
};
use crate::schema::{properties, token_bookings};
use crate::store::{BookingStore, Cancellation};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Builds a connection pool and runs a probe query so a bad `DATABASE_URL` fails
/// at startup rather than on the first request.
pub fn establish_pool(database_url: &str) -> Result<PgPool, StoreError> {
    info!("Connecting to database");
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder().build(manager).map_err(|e| {
        error!("Failed to build database pool: {}", e);
        e
    })?;

    let mut conn = pool.get()?;
    let probe: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1"))
        .get_result(&mut conn)?;
    info!("Database connection established (probe returned {})", probe);

    Ok(pool)
}

/// Postgres-backed [`BookingStore`]. Diesel is synchronous, so every call is
/// shipped to the blocking thread pool with its own pooled connection.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn release(
        conn: &mut PgConnection,
        property_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        diesel::update(properties::table.find(property_id))
            .set((
                properties::status.eq(PropertyStatus::Available),
                properties::updated_at.eq(now),
            ))
            .execute(conn)?;
        Ok(())
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut conn)
        })
        .await?
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_property(&self, property: Property) -> Result<Property, StoreError> {
        self.run(move |conn| {
            diesel::insert_into(properties::table)
                .values(&property)
                .execute(conn)?;
            Ok(property)
        })
        .await
    }

    async fn find_property(&self, id: Uuid) -> Result<Option<Property>, StoreError> {
        self.run(move |conn| {
            Ok(properties::table
                .find(id)
                .select(Property::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn update_property_fields(
        &self,
        id: Uuid,
        changes: PropertyChangeset,
        expected_status: Option<PropertyStatus>,
    ) -> Result<Option<Property>, StoreError> {
        self.run(move |conn| {
            let updated = match expected_status {
                Some(expected) => diesel::update(
                    properties::table
                        .filter(properties::id.eq(id))
                        .filter(properties::status.eq(expected)),
                )
                .set(&changes)
                .returning(Property::as_returning())
                .get_result(conn)
                .optional()?,
                None => diesel::update(properties::table.find(id))
                    .set(&changes)
                    .returning(Property::as_returning())
                    .get_result(conn)
                    .optional()?,
            };
            Ok(updated)
        })
        .await
    }

    async fn insert_reservation_claiming(
        &self,
        booking: TokenBooking,
    ) -> Result<Option<TokenBooking>, StoreError> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                // Conditional write: only one creator can move the row off `available`.
                let claimed = diesel::update(
                    properties::table
                        .filter(properties::id.eq(booking.property_id))
                        .filter(properties::status.eq(PropertyStatus::Available)),
                )
                .set((
                    properties::status.eq(PropertyStatus::TokenBooked),
                    properties::updated_at.eq(booking.created_at),
                ))
                .execute(conn)?;
                if claimed == 0 {
                    return Ok(None);
                }
                diesel::insert_into(token_bookings::table)
                    .values(&booking)
                    .execute(conn)?;
                Ok(Some(booking))
            })
        })
        .await
    }

    async fn find_reservation(&self, id: Uuid) -> Result<Option<TokenBooking>, StoreError> {
        self.run(move |conn| {
            Ok(token_bookings::table
                .find(id)
                .select(TokenBooking::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    async fn list_reservations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<TokenBooking>, StoreError> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            Ok(token_bookings::table
                .filter(
                    token_bookings::buyer_id
                        .eq(&user_id)
                        .or(token_bookings::seller_id.eq(&user_id)),
                )
                .order(token_bookings::created_at.desc())
                .select(TokenBooking::as_select())
                .load(conn)?)
        })
        .await
    }

    async fn update_reservation(&self, booking: &TokenBooking) -> Result<(), StoreError> {
        let booking = booking.clone();
        self.run(move |conn| {
            diesel::update(token_bookings::table.find(booking.id))
                .set(&booking)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn cancel_reservation(
        &self,
        id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
        require_active: bool,
    ) -> Result<Option<Cancellation>, StoreError> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                let active = token_bookings::status
                    .eq(ReservationStatus::Pending)
                    .or(token_bookings::status.eq(ReservationStatus::Confirmed));
                let released: Option<TokenBooking> = diesel::update(
                    token_bookings::table
                        .filter(token_bookings::id.eq(id))
                        .filter(active),
                )
                .set((
                    token_bookings::status.eq(ReservationStatus::Cancelled),
                    token_bookings::cancellation_reason.eq(reason.clone()),
                    token_bookings::updated_at.eq(now),
                ))
                .returning(TokenBooking::as_returning())
                .get_result(conn)
                .optional()?;
                if let Some(booking) = released {
                    Self::release(conn, booking.property_id, now)?;
                    return Ok(Some(Cancellation {
                        booking,
                        released: true,
                    }));
                }

                let booking: Option<TokenBooking> = if require_active {
                    token_bookings::table
                        .find(id)
                        .select(TokenBooking::as_select())
                        .first(conn)
                        .optional()?
                } else {
                    diesel::update(token_bookings::table.find(id))
                        .set((
                            token_bookings::status.eq(ReservationStatus::Cancelled),
                            token_bookings::cancellation_reason.eq(reason),
                            token_bookings::updated_at.eq(now),
                        ))
                        .returning(TokenBooking::as_returning())
                        .get_result(conn)
                        .optional()?
                };
                Ok(booking.map(|booking| Cancellation {
                    booking,
                    released: false,
                }))
            })
        })
        .await
    }

    async fn list_expired_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TokenBooking>, StoreError> {
        self.run(move |conn| {
            Ok(token_bookings::table
                .filter(token_bookings::status.eq(ReservationStatus::Pending))
                .filter(token_bookings::valid_until.lt(now))
                .select(TokenBooking::as_select())
                .load(conn)?)
        })
        .await
    }

    async fn expire_if_still_pending(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.run(move |conn| {
            conn.transaction::<_, StoreError, _>(|conn| {
                // Re-checked here: the seller may have moved the booking since it was listed.
                let property_id: Option<Uuid> = diesel::update(
                    token_bookings::table
                        .filter(token_bookings::id.eq(id))
                        .filter(token_bookings::status.eq(ReservationStatus::Pending))
                        .filter(token_bookings::valid_until.lt(now)),
                )
                .set((
                    token_bookings::status.eq(ReservationStatus::Cancelled),
                    token_bookings::cancellation_reason.eq(EXPIRED_REASON),
                    token_bookings::updated_at.eq(now),
                ))
                .returning(token_bookings::property_id)
                .get_result(conn)
                .optional()?;
                match property_id {
                    Some(property_id) => {
                        Self::release(conn, property_id, now)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            })
        })
        .await
    }
}
