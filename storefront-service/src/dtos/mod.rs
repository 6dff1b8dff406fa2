pub mod cart;
pub mod checkout;
pub mod orders;

pub use cart::{
    AddToCartRequest, CartQuery, CartResponse, LineItemDto, MergeCartRequest,
    RemoveCartItemRequest, UpdateCartItemRequest,
};
pub use checkout::{
    CheckoutItemRequest, CheckoutResponse, CreateCheckoutRequest, PayCheckoutRequest,
    ShippingAddressRequest,
};
pub use orders::{FinalizeResponse, MessageResponse, OrderResponse, UpdateOrderStatusRequest};
