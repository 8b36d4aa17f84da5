pub mod creative;
pub mod delivery;
pub mod media_buy;
pub mod pricing_option;
pub mod principal;
pub mod product;
pub mod tenant;
pub mod workflow_step;
