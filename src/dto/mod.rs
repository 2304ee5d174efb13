pub mod auth;
pub mod orders;
pub mod product_images;
pub mod products;
