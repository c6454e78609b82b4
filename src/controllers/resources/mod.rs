pub mod favourites;
pub mod history;
