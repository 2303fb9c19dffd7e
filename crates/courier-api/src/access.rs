use uuid::Uuid;

use courier_db::models::RequestRow;

/// A request is visible to exactly two people: whoever asked for the product
/// and the traveler who owns the trip.
pub fn can_access_request(user_id: Uuid, request: &RequestRow) -> bool {
    user_id == request.request.requester_id || user_id == request.trip_owner_id
}

/// The other party of the request, or `None` if `user_id` is not a party.
pub fn counterpart(user_id: Uuid, request: &RequestRow) -> Option<Uuid> {
    if !can_access_request(user_id, request) {
        return None;
    }
    if user_id == request.request.requester_id {
        Some(request.trip_owner_id)
    } else {
        Some(request.request.requester_id)
    }
}
