pub mod adagrad;
pub mod saga;
pub mod snspp;
pub mod svrg;
