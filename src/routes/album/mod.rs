mod handler;
mod model;

pub use handler::{
    add_photos, create_album, delete_album, delete_photo, list_albums, list_photos, update_album,
    update_photo,
};
