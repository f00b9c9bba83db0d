mod handler;
mod model;

pub use handler::{
    add_member, create_group, delete_group, find_by_name, get_group, list_members,
    list_my_groups, remove_member, update_group, update_member,
};
pub use model::{Group, GroupMember};

#[cfg(test)]
pub(crate) use model::tests::group_request;
