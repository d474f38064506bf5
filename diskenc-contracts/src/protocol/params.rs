// SPDX-License-Identifier: GPL-3.0-only

//! Encoding of [`EncryptionRequest`] as a D-Bus `a{sv}` map

use std::collections::HashMap;

use thiserror::Error;
use zbus::zvariant::{OwnedValue, Value};

use diskenc_types::{EncryptMode, EncryptionRequest, param_keys};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("parameter '{key}' has the wrong type, expected {expected}")]
    WrongType { key: String, expected: &'static str },

    #[error("parameter '{key}' has an unsupported value: {value}")]
    BadValue { key: String, value: String },

    #[error("cannot encode parameter '{key}': {reason}")]
    Encode { key: String, reason: String },
}

/// Build the parameter map for a request; unset fields are omitted
pub fn encode_params(request: &EncryptionRequest) -> Result<HashMap<String, OwnedValue>, ParamsError> {
    let mut params = HashMap::new();

    let strings = [
        (param_keys::DEVICE, &request.device),
        (param_keys::UUID, &request.uuid),
        (param_keys::CIPHER, &request.cipher),
        (param_keys::PASSPHRASE, &request.passphrase),
        (param_keys::OLD_PASSPHRASE, &request.old_passphrase),
        (param_keys::TPM_CONFIG, &request.tpm_config),
        (param_keys::RECOVERY_EXPORT_PATH, &request.recovery_export_path),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            insert(&mut params, key, Value::from(value.as_str()))?;
        }
    }

    if let Some(mode) = request.mode {
        insert(&mut params, param_keys::MODE, Value::from(mode.code()))?;
    }
    if let Some(key_size) = request.key_size {
        insert(&mut params, param_keys::KEY_SIZE, Value::from(key_size))?;
    }
    insert(&mut params, param_keys::INIT_PARAMS_ONLY, Value::from(request.init_only))?;
    insert(
        &mut params,
        param_keys::VALIDATE_WITH_RECOVERY_KEY,
        Value::from(request.validate_with_recovery_key),
    )?;

    Ok(params)
}

/// Decode a parameter map; unknown keys are ignored
pub fn decode_params(params: &HashMap<String, OwnedValue>) -> Result<EncryptionRequest, ParamsError> {
    let mode = match integer(params, param_keys::MODE)? {
        Some(code) => Some(
            i32::try_from(code)
                .ok()
                .and_then(EncryptMode::from_code)
                .ok_or_else(|| ParamsError::BadValue {
                    key: param_keys::MODE.to_string(),
                    value: code.to_string(),
                })?,
        ),
        None => None,
    };

    let key_size = match integer(params, param_keys::KEY_SIZE)? {
        Some(bits) => Some(u32::try_from(bits).map_err(|_| ParamsError::BadValue {
            key: param_keys::KEY_SIZE.to_string(),
            value: bits.to_string(),
        })?),
        None => None,
    };

    Ok(EncryptionRequest {
        device: string(params, param_keys::DEVICE)?,
        uuid: string(params, param_keys::UUID)?,
        cipher: string(params, param_keys::CIPHER)?,
        passphrase: string(params, param_keys::PASSPHRASE)?,
        old_passphrase: string(params, param_keys::OLD_PASSPHRASE)?,
        mode,
        key_size,
        tpm_config: string(params, param_keys::TPM_CONFIG)?,
        recovery_export_path: string(params, param_keys::RECOVERY_EXPORT_PATH)?,
        init_only: boolean(params, param_keys::INIT_PARAMS_ONLY)?.unwrap_or(false),
        validate_with_recovery_key: boolean(params, param_keys::VALIDATE_WITH_RECOVERY_KEY)?
            .unwrap_or(false),
    })
}

fn insert(
    params: &mut HashMap<String, OwnedValue>,
    key: &str,
    value: Value<'_>,
) -> Result<(), ParamsError> {
    let owned = OwnedValue::try_from(value).map_err(|e| ParamsError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })?;
    params.insert(key.to_string(), owned);
    Ok(())
}

/// Strip nested variant wrappers (`v` inside `v`)
fn unwrap_variant<'a>(value: &'a Value<'a>) -> &'a Value<'a> {
    match value {
        Value::Value(inner) => unwrap_variant(inner),
        other => other,
    }
}

fn string(params: &HashMap<String, OwnedValue>, key: &str) -> Result<Option<String>, ParamsError> {
    let Some(value) = params.get(key) else {
        return Ok(None);
    };
    match unwrap_variant(value) {
        Value::Str(s) => Ok(Some(s.as_str().to_string())),
        _ => Err(ParamsError::WrongType {
            key: key.to_string(),
            expected: "string",
        }),
    }
}

fn boolean(params: &HashMap<String, OwnedValue>, key: &str) -> Result<Option<bool>, ParamsError> {
    let Some(value) = params.get(key) else {
        return Ok(None);
    };
    match unwrap_variant(value) {
        Value::Bool(b) => Ok(Some(*b)),
        _ => Err(ParamsError::WrongType {
            key: key.to_string(),
            expected: "boolean",
        }),
    }
}

fn integer(params: &HashMap<String, OwnedValue>, key: &str) -> Result<Option<i64>, ParamsError> {
    let Some(value) = params.get(key) else {
        return Ok(None);
    };
    match unwrap_variant(value) {
        Value::I32(v) => Ok(Some(i64::from(*v))),
        Value::U32(v) => Ok(Some(i64::from(*v))),
        Value::I16(v) => Ok(Some(i64::from(*v))),
        Value::U16(v) => Ok(Some(i64::from(*v))),
        Value::U8(v) => Ok(Some(i64::from(*v))),
        Value::I64(v) => Ok(Some(*v)),
        _ => Err(ParamsError::WrongType {
            key: key.to_string(),
            expected: "integer",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(value: Value<'_>) -> OwnedValue {
        OwnedValue::try_from(value).unwrap()
    }

    #[test]
    fn decodes_front_end_prepare_map() {
        let mut params = HashMap::new();
        params.insert("device".to_string(), owned(Value::from("/dev/sda1")));
        params.insert("uuid".to_string(), owned(Value::from("1111-2222")));
        params.insert("cipher".to_string(), owned(Value::from("sm4")));
        params.insert("passphrase".to_string(), owned(Value::from("secret")));
        params.insert("initParamsOnly".to_string(), owned(Value::from(true)));
        params.insert("mode".to_string(), owned(Value::from(1i32)));
        params.insert("unrelated".to_string(), owned(Value::from(7u8)));

        let request = decode_params(&params).expect("decode params");
        assert_eq!(request.device.as_deref(), Some("/dev/sda1"));
        assert_eq!(request.uuid.as_deref(), Some("1111-2222"));
        assert_eq!(request.mode, Some(EncryptMode::TpmAndPin));
        assert!(request.init_only);
        assert!(!request.validate_with_recovery_key);
        assert_eq!(request.old_passphrase, None);
    }

    #[test]
    fn wrong_types_and_modes_are_rejected() {
        let mut params = HashMap::new();
        params.insert("device".to_string(), owned(Value::from(5i32)));
        assert!(matches!(
            decode_params(&params),
            Err(ParamsError::WrongType { expected: "string", .. })
        ));

        let mut params = HashMap::new();
        params.insert("mode".to_string(), owned(Value::from(9i32)));
        assert!(matches!(decode_params(&params), Err(ParamsError::BadValue { .. })));
    }

    #[test]
    fn encoded_request_decodes_to_the_same_request() {
        let request = EncryptionRequest {
            device: Some("/dev/sdb1".to_string()),
            passphrase: Some("new".to_string()),
            old_passphrase: Some("old".to_string()),
            key_size: Some(512),
            mode: Some(EncryptMode::TpmOnly),
            validate_with_recovery_key: true,
            ..Default::default()
        };

        let params = encode_params(&request).expect("encode params");
        assert_eq!(decode_params(&params).expect("decode params"), request);
    }
}
