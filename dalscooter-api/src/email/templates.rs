//! Notification email bodies

use chrono::{DateTime, Utc};
use dalscooter_core::{Booking, SupportMessage};

use super::EmailMessage;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Sent after a successful registration
pub fn welcome(to: &str, first_name: &str) -> EmailMessage {
    let name = html_escape(first_name);
    EmailMessage {
        to: to.to_string(),
        subject: "Welcome to DalScooter!".into(),
        body_text: format!("Hi {}, thanks for signing up with DalScooter!", first_name),
        body_html: Some(format!(
            r#"<!DOCTYPE html>
<html lang="en">
<body style="font-family: Arial, sans-serif; color: #333; max-width: 600px; margin: 0 auto;">
  <div style="background-color: #002D72; color: white; padding: 20px; text-align: center;">
    <h1>Welcome to DalScooter!</h1>
  </div>
  <div style="background-color: #f9f9f9; padding: 20px;">
    <h2>Hi {name},</h2>
    <p>Your account has been created and is ready to use. You can start booking scooters right away.</p>
    <ul>
      <li>Book scooters for campus travel</li>
      <li>Track your rides and history</li>
    </ul>
    <p>Happy scooting!<br>The DalScooter Team</p>
  </div>
</body>
</html>"#
        )),
    }
}

/// Sent when a login passes every factor
pub fn login_alert(to: &str, at: DateTime<Utc>) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "New sign-in to your DalScooter account".into(),
        body_text: format!(
            "Your DalScooter account was signed in to at {}.\n\n\
             If this wasn't you, reset your password and contact support.",
            at.format(TIME_FORMAT)
        ),
        body_html: None,
    }
}

/// Sent by the approval worker once an access code is issued
pub fn booking_confirmation(to: &str, booking: &Booking) -> EmailMessage {
    let start = booking.start_time.format(TIME_FORMAT);
    let end = booking.end_time.format(TIME_FORMAT);
    EmailMessage {
        to: to.to_string(),
        subject: "Your DalScooter booking is confirmed".into(),
        body_text: format!(
            "Your booking {} for bike {} has been approved.\n\n\
             Access code: {}\n\
             From: {}\n\
             Until: {}\n\n\
             The code stops working once the booking ends.",
            booking.booking_id, booking.bike_id, booking.access_code, start, end
        ),
        body_html: Some(format!(
            "<p>Your booking <b>{}</b> for bike <b>{}</b> has been approved.</p>\
             <p style=\"font-size: 24px; letter-spacing: 4px;\">{}</p>\
             <p>From {} until {}.</p>",
            html_escape(booking.booking_id.as_str()),
            html_escape(&booking.bike_id),
            html_escape(&booking.access_code),
            start,
            end
        )),
    }
}

/// Sent to the franchise operator a concern is assigned to
pub fn concern_assigned(to: &str, concern: &SupportMessage) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: "New Customer Concern".into(),
        body_text: format!(
            "A customer concern has been assigned to you.\n\n\
             Concern ID: {}\n\
             Booking ID: {}\n\
             Customer ID: {}\n\
             Content: {}\n\n\
             Please respond from the franchise dashboard.",
            concern.message_id,
            concern.booking_id.as_deref().unwrap_or("N/A"),
            concern.user_id,
            concern.content
        ),
        body_html: None,
    }
}
