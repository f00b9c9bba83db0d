mod handler;
mod model;

pub use handler::{
    delete_friendship, get_between, list_friends, list_requests, send_request, update_status,
};
pub use model::{Friendship, FriendshipStatus};
