//! Text of the notifications and emails sent on request transitions.

use crate::request::{RequestData, RequestStatus, RequestType};

pub(crate) fn submitted(request_type: &RequestType) -> String {
    format!(
        "Your request for \"{}\" has been submitted successfully.",
        request_type
    )
}

/// Email body for a submission: the notification plus the description.
pub(crate) fn submitted_email(data: &RequestData) -> String {
    format!(
        "{}\nDescription: {}",
        submitted(&data.request_type),
        data.description
    )
}

pub(crate) fn status_changed(
    request_type: &RequestType,
    status: RequestStatus,
    note: Option<&str>,
) -> String {
    let mut message = format!(
        "Your request for \"{}\" has been {}.",
        request_type,
        status.as_str()
    );
    if let Some(note) = note {
        message.push_str("\nNote: ");
        message.push_str(note);
    }
    message
}
