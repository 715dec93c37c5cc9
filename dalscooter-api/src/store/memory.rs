//! In-memory storage implementations

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use dalscooter_core::{
    Booking, BookingId, Feedback, Group, MessageId, MessageStatus, SecurityQuestion,
    SupportMessage,
};
use uuid::Uuid;

use super::{
    poisoned, Bike, BookingChange, BookingGuard, BookingStore, MessageUpdate, NewUser,
    SecurityQuestionRecord, StoreResult, SupportStore, UpdateOutcome, User, UserId, UserStore,
};
use crate::error::ApiError;

/// In-memory identity directory
pub struct InMemoryUserStore {
    users: RwLock<HashMap<UserId, User>>,
    emails: RwLock<HashMap<String, UserId>>,
    questions: RwLock<HashMap<UserId, Vec<SecurityQuestionRecord>>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            emails: RwLock::new(HashMap::new()),
            questions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStore for InMemoryUserStore {
    fn create_user(&self, user: &NewUser, password_hash: &str) -> StoreResult<UserId> {
        let normalized = user.email.to_lowercase();
        let mut emails = self.emails.write().map_err(poisoned)?;
        if emails.contains_key(&normalized) {
            return Err(ApiError::EmailAlreadyExists);
        }

        let id = UserId(Uuid::new_v4().to_string());
        let record = User {
            id: id.clone(),
            email: normalized.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            password_hash: password_hash.to_string(),
            confirmed: false,
            groups: Vec::new(),
            created_at: Utc::now(),
        };
        self.users
            .write()
            .map_err(poisoned)?
            .insert(id.clone(), record);
        emails.insert(normalized, id.clone());
        Ok(id)
    }

    fn confirm_user(&self, user_id: &UserId) -> StoreResult<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        let user = users.get_mut(user_id).ok_or(ApiError::UserNotFound)?;
        user.confirmed = true;
        Ok(())
    }

    fn add_to_group(&self, user_id: &UserId, group: Group) -> StoreResult<()> {
        let mut users = self.users.write().map_err(poisoned)?;
        let user = users.get_mut(user_id).ok_or(ApiError::UserNotFound)?;
        if !user.groups.contains(&group) {
            user.groups.push(group);
        }
        Ok(())
    }

    fn get_user(&self, user_id: &UserId) -> StoreResult<Option<User>> {
        Ok(self.users.read().map_err(poisoned)?.get(user_id).cloned())
    }

    fn get_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let normalized = email.to_lowercase();
        let user_id = self.emails.read().map_err(poisoned)?.get(&normalized).cloned();
        match user_id {
            Some(id) => self.get_user(&id),
            None => Ok(None),
        }
    }

    fn list_users_in_group(&self, group: Group) -> StoreResult<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|u| u.confirmed && u.groups.contains(&group))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(users)
    }

    fn put_questions(&self, user_id: &UserId, questions: &[SecurityQuestion]) -> StoreResult<()> {
        if !self.users.read().map_err(poisoned)?.contains_key(user_id) {
            return Err(ApiError::UserNotFound);
        }
        let now = Utc::now();
        let records = questions
            .iter()
            .map(|q| SecurityQuestionRecord::new(user_id, q, now))
            .collect();
        self.questions
            .write()
            .map_err(poisoned)?
            .insert(user_id.clone(), records);
        Ok(())
    }

    fn get_questions(&self, user_id: &UserId) -> StoreResult<Vec<SecurityQuestionRecord>> {
        let questions = self.questions.read().map_err(poisoned)?;
        Ok(questions
            .get(user_id)
            .map(|records| records.iter().filter(|r| r.is_active).cloned().collect())
            .unwrap_or_default())
    }
}

/// In-memory booking and bike store
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<BookingId, Booking>>,
    bikes: RwLock<HashMap<String, Bike>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self {
            bookings: RwLock::new(HashMap::new()),
            bikes: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryBookingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BookingStore for InMemoryBookingStore {
    fn put_booking(&self, booking: &Booking) -> StoreResult<()> {
        self.bookings
            .write()
            .map_err(poisoned)?
            .insert(booking.booking_id.clone(), booking.clone());
        Ok(())
    }

    fn get_booking(&self, booking_id: &BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.bookings.read().map_err(poisoned)?.get(booking_id).cloned())
    }

    fn update_booking_if(
        &self,
        booking_id: &BookingId,
        guard: BookingGuard,
        change: BookingChange,
    ) -> StoreResult<UpdateOutcome> {
        // Check and mutate under one write lock
        let mut bookings = self.bookings.write().map_err(poisoned)?;
        let Some(booking) = bookings.get_mut(booking_id) else {
            return Ok(UpdateOutcome::NotFound);
        };
        if !guard.holds(booking) {
            return Ok(UpdateOutcome::GuardFailed(booking.clone()));
        }
        let before = booking.clone();
        change.apply(booking);
        Ok(UpdateOutcome::Applied {
            before,
            after: booking.clone(),
        })
    }

    fn scan_bookings(&self) -> StoreResult<Vec<Booking>> {
        Ok(self.bookings.read().map_err(poisoned)?.values().cloned().collect())
    }

    fn list_bookings_for_user(&self, user_id: &str) -> StoreResult<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookings.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(bookings)
    }

    fn put_bike(&self, bike: &Bike) -> StoreResult<()> {
        self.bikes
            .write()
            .map_err(poisoned)?
            .insert(bike.bike_id.clone(), bike.clone());
        Ok(())
    }

    fn get_bike(&self, bike_id: &str) -> StoreResult<Option<Bike>> {
        Ok(self.bikes.read().map_err(poisoned)?.get(bike_id).cloned())
    }

    fn list_bikes(&self) -> StoreResult<Vec<Bike>> {
        let mut bikes: Vec<Bike> = self.bikes.read().map_err(poisoned)?.values().cloned().collect();
        bikes.sort_by(|a, b| a.bike_id.cmp(&b.bike_id));
        Ok(bikes)
    }

    fn rent_bike(&self, bike_id: &str, access_code: &str) -> StoreResult<bool> {
        let mut bikes = self.bikes.write().map_err(poisoned)?;
        match bikes.get_mut(bike_id) {
            Some(bike) => {
                bike.is_active = false;
                bike.access_code = access_code.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn release_bike(&self, bike_id: &str, access_code: &str) -> StoreResult<bool> {
        let mut bikes = self.bikes.write().map_err(poisoned)?;
        match bikes.get_mut(bike_id) {
            Some(bike) if bike.access_code == access_code && !access_code.is_empty() => {
                bike.is_active = true;
                bike.access_code.clear();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory store for concerns and feedback
#[derive(Default)]
pub struct InMemorySupportStore {
    messages: RwLock<HashMap<MessageId, SupportMessage>>,
    feedback: RwLock<Vec<Feedback>>,
}

impl InMemorySupportStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn messages_where<F>(&self, keep: F) -> StoreResult<Vec<SupportMessage>>
    where
        F: Fn(&SupportMessage) -> bool,
    {
        let mut messages: Vec<SupportMessage> = self
            .messages
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|m| keep(m))
            .cloned()
            .collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages)
    }
}

impl SupportStore for InMemorySupportStore {
    fn put_message(&self, message: &SupportMessage) -> StoreResult<()> {
        self.messages
            .write()
            .map_err(poisoned)?
            .insert(message.message_id.clone(), message.clone());
        Ok(())
    }

    fn get_message(&self, message_id: &MessageId) -> StoreResult<Option<SupportMessage>> {
        Ok(self.messages.read().map_err(poisoned)?.get(message_id).cloned())
    }

    fn assign_concern(
        &self,
        message_id: &MessageId,
        franchise_id: &str,
    ) -> StoreResult<MessageUpdate> {
        let mut messages = self.messages.write().map_err(poisoned)?;
        let Some(concern) = messages.get_mut(message_id).filter(|m| m.is_concern()) else {
            return Ok(MessageUpdate::NotFound);
        };
        if concern.status != MessageStatus::Open {
            return Ok(MessageUpdate::Unchanged(concern.clone()));
        }
        concern.franchise_id = Some(franchise_id.to_string());
        concern.status = MessageStatus::Assigned;
        Ok(MessageUpdate::Applied(concern.clone()))
    }

    fn resolve_concern(&self, response: &SupportMessage) -> StoreResult<MessageUpdate> {
        let Some(concern_id) = &response.in_reply_to else {
            return Ok(MessageUpdate::NotFound);
        };
        let mut messages = self.messages.write().map_err(poisoned)?;
        let Some(concern) = messages.get_mut(concern_id).filter(|m| m.is_concern()) else {
            return Ok(MessageUpdate::NotFound);
        };
        concern.status = MessageStatus::Resolved;
        if concern.franchise_id.is_none() {
            concern.franchise_id = response.franchise_id.clone();
        }
        let resolved = concern.clone();
        messages.insert(response.message_id.clone(), response.clone());
        Ok(MessageUpdate::Applied(resolved))
    }

    fn list_messages_for_user(&self, user_id: &str) -> StoreResult<Vec<SupportMessage>> {
        self.messages_where(|m| m.user_id == user_id)
    }

    fn list_messages_for_franchise(&self, franchise_id: &str) -> StoreResult<Vec<SupportMessage>> {
        self.messages_where(|m| m.franchise_id.as_deref() == Some(franchise_id))
    }

    fn put_feedback(&self, feedback: &Feedback) -> StoreResult<()> {
        self.feedback.write().map_err(poisoned)?.push(feedback.clone());
        Ok(())
    }

    fn list_feedback(&self, bike_id: Option<&str>) -> StoreResult<Vec<Feedback>> {
        let mut feedback: Vec<Feedback> = self
            .feedback
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|f| bike_id.map_or(true, |id| f.bike_id == id))
            .cloned()
            .collect();
        feedback.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(feedback)
    }
}
