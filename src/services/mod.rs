pub mod checkout;
pub mod email;
pub mod gateway;
pub mod pricing;
pub mod recovery;
pub mod verification;
