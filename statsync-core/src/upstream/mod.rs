pub mod client;
pub mod identity;
pub mod rate_limit;
pub mod stats;

pub use client::{DEFAULT_API_KEY_HEADER, RateLimitedClient};
pub use identity::{
    DEFAULT_SECONDARY_CAPE_TEMPLATE, DecodedTextures, IdentityApi,
    IdentityProfile, MojangIdentityApi, TextureProbe, decode_textures,
};
pub use rate_limit::{RateLimitPolicy, RateWindow, Reservation};
pub use stats::{HypixelStatsApi, StatsApi, display_name, stat_value};
