use std::fmt;
use std::io::Write;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Declares a closed set of lowercase string values that travel as JSON strings
/// and are stored in `TEXT` columns.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
        #[diesel(sql_type = Text)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "'{}' is not one of {}",
                        other,
                        $name::ALL.iter().map($name::as_str).collect::<Vec<_>>().join(", ")
                    )),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let text = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                text.parse::<$name>().map_err(Into::into)
            }
        }
    };
}

text_enum! {
    /// Availability of a listing. `token_booked` mirrors an active reservation.
    PropertyStatus {
        Available => "available",
        TokenBooked => "token_booked",
        Sold => "sold",
        Rented => "rented",
    }
}

text_enum! {
    BookingType {
        Rent => "rent",
        Sale => "sale",
    }
}

text_enum! {
    ReservationStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Rejected => "rejected",
        Cancelled => "cancelled",
        Completed => "completed",
    }
}

text_enum! {
    PaymentStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Refunded => "refunded",
    }
}

text_enum! {
    PaymentMethod {
        Online => "online",
        Cash => "cash",
        BankTransfer => "bank_transfer",
    }
}

text_enum! {
    AgreementStatus {
        Pending => "pending",
        Signed => "signed",
        Rejected => "rejected",
    }
}

/// Cancellation reason written by the expiry sweep.
pub const EXPIRED_REASON: &str = "reservation expired";

impl ReservationStatus {
    /// Pending and confirmed reservations hold the property.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::properties)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub price: f64,
    pub status: PropertyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub fn new(owner_id: &str, title: String, price: f64, status: PropertyStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            title,
            price,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A token booking: a buyer's partial-payment hold on a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::token_bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
#[serde(rename_all = "camelCase")]
pub struct TokenBooking {
    pub id: Uuid,
    pub property_id: Uuid,
    pub buyer_id: String,
    pub seller_id: String,
    pub token_amount: f64,
    pub total_property_value: f64,
    pub booking_type: BookingType,
    pub duration: Option<i32>,
    pub status: ReservationStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub payment_proof: Option<String>,
    pub agreement_status: AgreementStatus,
    pub agreement_document: Option<String>,
    pub valid_until: DateTime<Utc>,
    pub cancellation_reason: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenBooking {
    /// Builds a fresh pending booking against `property`, snapshotting its price
    /// and owner.
    pub fn pending(
        buyer_id: &str,
        property: &Property,
        draft: TokenBookingDraft,
        now: DateTime<Utc>,
        validity: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            property_id: property.id,
            buyer_id: buyer_id.to_string(),
            seller_id: property.owner_id.clone(),
            token_amount: draft.token_amount,
            total_property_value: property.price,
            booking_type: draft.booking_type,
            duration: draft.duration,
            status: ReservationStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: draft.payment_method,
            payment_proof: None,
            agreement_status: AgreementStatus::Pending,
            agreement_document: None,
            valid_until: now + validity,
            cancellation_reason: None,
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }
}

pub const MAX_NOTES_LEN: usize = 1000;

/// Body of `POST /token-bookings`, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenBookingRequest {
    pub property_id: Option<String>,
    pub token_amount: Option<f64>,
    pub booking_type: Option<String>,
    pub duration: Option<i64>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

/// A create request that passed shape validation.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBookingDraft {
    pub property_id: Uuid,
    pub token_amount: f64,
    pub booking_type: BookingType,
    pub duration: Option<i32>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
}

impl CreateTokenBookingRequest {
    pub fn validate(self) -> Result<TokenBookingDraft, ApiError> {
        let property_id = self
            .property_id
            .ok_or_else(|| ApiError::Validation("propertyId is required".into()))?;
        let property_id = Uuid::parse_str(property_id.trim())
            .map_err(|_| ApiError::Validation("propertyId must be a valid id".into()))?;

        let token_amount = self
            .token_amount
            .ok_or_else(|| ApiError::Validation("tokenAmount is required".into()))?;
        if !token_amount.is_finite() || token_amount < 0.0 {
            return Err(ApiError::Validation(
                "tokenAmount must be a non-negative number".into(),
            ));
        }

        let booking_type: BookingType = self
            .booking_type
            .ok_or_else(|| ApiError::Validation("bookingType is required".into()))?
            .parse()
            .map_err(|e| ApiError::Validation(format!("bookingType: {}", e)))?;

        // Duration only means something for rentals; a sale silently drops it.
        let duration = match booking_type {
            BookingType::Rent => {
                let months = self.duration.ok_or_else(|| {
                    ApiError::Validation("duration is required for rent bookings".into())
                })?;
                let months = i32::try_from(months)
                    .ok()
                    .filter(|m| *m >= 1)
                    .ok_or_else(|| {
                        ApiError::Validation("duration must be a whole number of months, at least 1".into())
                    })?;
                Some(months)
            }
            BookingType::Sale => None,
        };

        let payment_method: PaymentMethod = self
            .payment_method
            .ok_or_else(|| ApiError::Validation("paymentMethod is required".into()))?
            .parse()
            .map_err(|e| ApiError::Validation(format!("paymentMethod: {}", e)))?;

        let notes = self.notes.filter(|n| !n.trim().is_empty());
        if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            return Err(ApiError::Validation(format!(
                "notes must be at most {} characters",
                MAX_NOTES_LEN
            )));
        }

        Ok(TokenBookingDraft {
            property_id,
            token_amount,
            booking_type,
            duration,
            payment_method,
            notes,
        })
    }
}

/// Seller-side status update. Each field is applied independently.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPatch {
    pub status: Option<ReservationStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub agreement_status: Option<AgreementStatus>,
}

impl StatusPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.payment_status.is_none() && self.agreement_status.is_none()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPropertyRequest {
    pub title: String,
    pub price: f64,
    pub status: Option<PropertyStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyUpdate {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub status: Option<PropertyStatus>,
}

/// Columns an owner edit writes. `None` fields are left as stored.
#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = crate::schema::properties)]
pub struct PropertyChangeset {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub status: Option<PropertyStatus>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PropertyChangeset {
    pub fn apply_to(self, property: &mut Property) {
        if let Some(title) = self.title {
            property.title = title;
        }
        if let Some(price) = self.price {
            property.price = price;
        }
        if let Some(status) = self.status {
            property.status = status;
        }
        if let Some(updated_at) = self.updated_at {
            property.updated_at = updated_at;
        }
    }
}
