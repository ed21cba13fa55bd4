// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! JSON module registration for Lua.
//!
//! Provides `json.encode`, `json.decode`, `json.encode_pretty`, and `json.null`
//! to pages, both as a global and through `require("json")`.

use mlua::{Lua, LuaSerdeExt, Result as LuaResult, Table, Value};

/// Builds a fresh `json` module table.
fn json_module(lua: &Lua) -> LuaResult<Table> {
    let module = lua.create_table()?;

    let encode = lua.create_function(|lua, value: Value| {
        let value = lua.from_value::<serde_json::Value>(value)?;
        serde_json::to_string(&value)
            .map_err(|err| mlua::Error::external(format!("JSON encode error: {}", err)))
    })?;
    module.set("encode", encode)?;

    let encode_pretty = lua.create_function(|lua, value: Value| {
        let value = lua.from_value::<serde_json::Value>(value)?;
        serde_json::to_string_pretty(&value)
            .map_err(|err| mlua::Error::external(format!("JSON encode error: {}", err)))
    })?;
    module.set("encode_pretty", encode_pretty)?;

    let decode = lua.create_function(|lua, json_str: String| {
        match serde_json::from_str::<serde_json::Value>(&json_str) {
            Ok(json_value) => lua.to_value(&json_value),
            Err(err) => Err(mlua::Error::external(format!("JSON decode error: {}", err))),
        }
    })?;
    module.set("decode", decode)?;

    // Lua has no null; serialize maps this sentinel to JSON null.
    module.set("null", lua.null())?;

    Ok(module)
}

/// Registers the json module as a global and in `package.preload`.
///
/// # Example
///
/// ```rust,ignore
/// use mlua::Lua;
/// use luap::extensions::json::register_json_module;
///
/// let lua = Lua::new();
/// register_json_module(&lua)?;
/// lua.load(r#"assert(json.encode({1, 2}) == "[1,2]")"#).exec()?;
/// ```
pub fn register_json_module(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();
    globals.set("json", json_module(lua)?)?;

    let package: Table = globals.get("package")?;
    let preload: Table = package.get("preload")?;
    let loader = lua.create_function(|lua, _: ()| json_module(lua))?;
    preload.set("json", loader)?;

    tracing::debug!("Registered json module");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lua() -> Lua {
        let lua = Lua::new();
        register_json_module(&lua).unwrap();
        lua
    }

    #[test]
    fn test_encode_decode() {
        let lua = lua();
        let out: String = lua
            .load(r#"return json.encode({ name = "luap" })"#)
            .eval()
            .unwrap();
        assert_eq!(out, r#"{"name":"luap"}"#);

        let n: i64 = lua
            .load(r#"return json.decode('{"a": [1, 2, 3]}').a[3]"#)
            .eval()
            .unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_null_encodes_as_null() {
        let lua = lua();
        let out: String = lua.load("return json.encode({ json.null })").eval().unwrap();
        assert_eq!(out, "[null]");
    }

    #[test]
    fn test_require_json() {
        let lua = lua();
        let out: String = lua
            .load(r#"local j = require("json"); return j.encode(true)"#)
            .eval()
            .unwrap();
        assert_eq!(out, "true");
    }

    #[test]
    fn test_decode_error() {
        let lua = lua();
        let err = lua.load(r#"json.decode("{")"#).exec().unwrap_err();
        assert!(err.to_string().contains("JSON decode error"));
    }
}
