mod handler;
mod model;

pub use handler::{
    delete_me, get_me, get_user, list_users, login, refresh_token, register, update_me,
};
pub use model::{CreateUserRequest, UpdateUserRequest, User};
pub(crate) use model::USER_COLUMNS;

#[cfg(test)]
pub(crate) use model::tests::create_test_user;
