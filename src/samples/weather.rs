use serde::Deserialize;
use serde_json::json;

use crate::tools::{ParameterType, ToolParameter, ToolResult, ToolSpec};

const CONDITIONS: [&str; 5] = ["sunny", "partly cloudy", "cloudy", "rainy", "windy"];

/// Simulated weather report. The same city always gets the same weather.
pub fn report(city: &str) -> (&'static str, i32) {
    let seed = city
        .trim()
        .to_lowercase()
        .bytes()
        .fold(17u32, |acc, byte| acc.wrapping_mul(31).wrapping_add(u32::from(byte)));
    let condition = CONDITIONS[(seed % CONDITIONS.len() as u32) as usize];
    let temperature = (seed / 7 % 30) as i32 + 2;
    (condition, temperature)
}

pub fn get_weather_tool() -> ToolSpec {
    #[derive(Deserialize)]
    struct Args {
        city: String,
    }

    ToolSpec::new("get_weather", "Get the current weather for a city")
        .with_parameters(vec![ToolParameter::required(
            "city",
            ParameterType::String,
            "Name of the city, e.g. Seattle",
        )])
        .expect("valid parameters")
        .with_typed_handler(|args: Args, _ctx| async move {
            let city = args.city.trim().to_string();
            if city.is_empty() {
                return Ok(ToolResult::failure("city must not be empty"));
            }

            let (condition, temperature) = report(&city);
            Ok(
                ToolResult::success(format!("{city}: {condition}, {temperature}°C")).with_data(
                    json!({
                        "city": city,
                        "condition": condition,
                        "temperature_c": temperature,
                    }),
                ),
            )
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tools::ToolContext;

    #[test]
    fn reports_are_stable_per_city() {
        assert_eq!(report("Seattle"), report(" seattle "));
        let (_, temperature) = report("Reykjavik");
        assert!((2..32).contains(&temperature));
    }

    #[tokio::test]
    async fn tool_returns_structured_weather() {
        let result = get_weather_tool()
            .execute(json!({"city": "Seattle"}), &ToolContext::new())
            .await
            .expect("executes");
        assert!(result.success);
        assert!(result.message.starts_with("Seattle: "));
        assert_eq!(result.data.unwrap()["city"], json!("Seattle"));
    }

    #[tokio::test]
    async fn blank_city_is_a_failure_result() {
        let result = get_weather_tool()
            .execute(json!({"city": "  "}), &ToolContext::new())
            .await
            .expect("executes");
        assert!(!result.success);
    }
}
