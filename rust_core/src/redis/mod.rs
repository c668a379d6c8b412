pub mod bus;
pub mod cache;

pub use bus::RedisBus;
pub use cache::{cache_value, is_price_key, PriceCache, RedisPriceCache};
