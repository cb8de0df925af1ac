//! Service call handler.

use serde_json::Value;

use hasslink_core::{ClientConfig, HassClient};

use crate::cli::{CallArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Merge `--data` and `--entity` into one service-data object.
fn service_data(data: Option<&str>, entity: Option<String>) -> Result<Option<Value>, CliError> {
    let mut payload = match data {
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ => {
                return Err(CliError::Validation {
                    field: "data".into(),
                    reason: "must be a JSON object".into(),
                });
            }
        },
        None => serde_json::Map::new(),
    };

    if let Some(entity) = entity {
        payload.insert("entity_id".into(), Value::String(entity));
    }
    Ok((!payload.is_empty()).then_some(Value::Object(payload)))
}

pub async fn handle(config: ClientConfig, args: CallArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let data = service_data(args.data.as_deref(), args.entity)?;
    let service = format!("{}.{}", args.domain, args.service);

    let result = HassClient::oneshot(config, |client| async move {
        client.call_service(&args.domain, &args.service, data).await
    })
    .await?;

    let out = output::render_single(
        &global.output,
        &result,
        |_| format!("✓ Called {service}"),
        |_| service.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn entity_flag_merges_into_data() {
        let data = service_data(Some(r#"{"brightness": 128}"#), Some("light.kitchen".into()))
            .unwrap()
            .unwrap();
        assert_eq!(data, json!({ "brightness": 128, "entity_id": "light.kitchen" }));
    }

    #[test]
    fn no_data_sends_nothing() {
        assert!(service_data(None, None).unwrap().is_none());
    }

    #[test]
    fn non_object_data_is_rejected() {
        assert!(matches!(
            service_data(Some("[1, 2]"), None),
            Err(CliError::Validation { .. })
        ));
    }
}
