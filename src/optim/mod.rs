//! Optimizers (Adam, SGD, RMSProp, Adagrad)

mod adagrad;
mod adam;
mod optimizer;
mod rmsprop;
mod sgd;

pub use adagrad::Adagrad;
pub use adam::Adam;
pub use optimizer::Optimizer;
pub use rmsprop::RmsProp;
pub use sgd::Sgd;

/// Recognized optimizer names
pub const OPTIMIZER_NAMES: [&str; 4] = ["adam", "sgd", "rmsprop", "adagrad"];

/// Whether `name` maps to a provided optimizer (case-insensitive)
pub fn is_known_optimizer(name: &str) -> bool {
    OPTIMIZER_NAMES.contains(&name.trim().to_lowercase().as_str())
}

/// Build an optimizer from its name with library defaults
///
/// Unknown names fall back to Adam, matching the reference behavior of the
/// training request path; callers that need strict checking validate the
/// name first.
pub fn make_optimizer(name: &str, lr: f32) -> Box<dyn Optimizer> {
    match name.trim().to_lowercase().as_str() {
        "sgd" => Box::new(Sgd::new(lr, 0.9)),
        "rmsprop" => Box::new(RmsProp::default_params(lr)),
        "adagrad" => Box::new(Adagrad::default_params(lr)),
        _ => Box::new(Adam::default_params(lr)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_optimizer_names() {
        assert!(is_known_optimizer("adam"));
        assert!(is_known_optimizer(" SGD "));
        assert!(!is_known_optimizer("lbfgs"));
    }

    #[test]
    fn test_factory_builds_each() {
        for name in OPTIMIZER_NAMES {
            let opt = make_optimizer(name, 0.01);
            assert_eq!(opt.lr(), 0.01);
        }
    }
}
