pub mod checkout;
pub mod orders;
pub mod verification;

pub use checkout::CheckoutService;
pub use orders::OrderService;
pub use verification::VerificationService;
