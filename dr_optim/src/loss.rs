//! Loss functions.

use dr_core::{Result, Value};

/// Mean Squared Error loss: mean((pred - target)^2)
pub fn mse(pred: &Value, target: &Value) -> Result<Value> {
    Ok(pred.try_sub(target)?.sqr().mean())
}

/// Sum of squared differences: sum((pred - target)^2)
pub fn squared_error(pred: &Value, target: &Value) -> Result<Value> {
    Ok(pred.try_sub(target)?.sqr().sum())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_core::{AdFlags, Error, Graph};

    #[test]
    fn test_mse_value_and_gradient() {
        let graph = Graph::new();
        let mut pred = Value::rgb(1.0, 2.0, 3.0);
        graph.enable_grad(&mut pred).unwrap();
        let target = Value::rgb(1.0, 1.0, 1.0);

        let loss = mse(&pred, &target).unwrap();
        assert!((loss.item() - 5.0 / 3.0).abs() < 1e-12);

        graph.backward(&loss, AdFlags::NONE).unwrap();
        let expected = [0.0, 2.0 / 3.0, 4.0 / 3.0];
        for (g, e) in graph.grad(&pred).unwrap().data().iter().zip(expected) {
            assert!((g - e).abs() < 1e-12);
        }
    }

    #[test]
    fn test_squared_error() {
        let loss = squared_error(&Value::scalar(0.1), &Value::scalar(0.7)).unwrap();
        assert!((loss.item() - 0.36).abs() < 1e-12);
    }

    #[test]
    fn test_loss_shape_mismatch() {
        let err = mse(&Value::rgb(0.0, 0.0, 0.0), &Value::zeros(2)).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
