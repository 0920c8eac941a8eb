//! Sensor platform entities

use serde_json::Value;

use crate::entity::Entity;

/// An entity whose state is a single measured value
pub trait SensorEntity: Entity {
    fn native_value(&self) -> Option<Value>;

    fn native_unit_of_measurement(&self) -> Option<String> {
        None
    }

    /// State string for the native value
    fn sensor_state(&self) -> Option<String> {
        match self.native_value()? {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixed(Option<Value>);

    impl Entity for Fixed {
        fn name(&self) -> Option<String> {
            Some("fixed".to_string())
        }
    }

    impl SensorEntity for Fixed {
        fn native_value(&self) -> Option<Value> {
            self.0.clone()
        }
    }

    #[test]
    fn test_sensor_state_formats_value() {
        assert_eq!(Fixed(Some(json!(3))).sensor_state().as_deref(), Some("3"));
        assert_eq!(Fixed(Some(json!("abc"))).sensor_state().as_deref(), Some("abc"));
        assert_eq!(Fixed(Some(Value::Null)).sensor_state(), None);
        assert_eq!(Fixed(None).sensor_state(), None);
    }
}
