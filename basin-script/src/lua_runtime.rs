//! The scripting runtime: a fresh `mlua::Lua` per invocation (spec §5's
//! "engine pool" is a pool of one, recreated each call — see DESIGN.md).
//! Globals `data`, `query`, `me`, `isRoot`, `method` are bound as Lua
//! values; host functions `error`, `cancel`, `hide`, `protect`, `log` close
//! over the shared context. On return the bridge walks the live Lua tables
//! back into `serde_json::Value` rather than trusting the values it handed
//! in, satisfying the mutation round-trip contract.

use std::cell::RefCell;
use std::rc::Rc;

use mlua::{Lua, MultiValue, Table, Value as LuaValue, Variadic};
use serde_json::{Map, Value as JsonValue};

use crate::context::RequestContext;
use crate::error::ScriptError;

pub fn invoke(source: &str, location: &str, ctx: &Rc<RefCell<RequestContext>>) -> Result<(), ScriptError> {
    let lua = Lua::new();

    let data_table = json_to_table(&lua, &JsonValue::Object(ctx.borrow().data.clone()))
        .map_err(|e| runtime_error(location, e))?;
    let query_table = json_to_table(&lua, &basin_query::query_to_json(&ctx.borrow().query))
        .map_err(|e| runtime_error(location, e))?;
    let me_value = json_to_lua(&lua, &ctx.borrow().me.clone().unwrap_or(JsonValue::Null))
        .map_err(|e| runtime_error(location, e))?;

    let globals = lua.globals();
    globals.set("data", data_table.clone()).map_err(|e| runtime_error(location, e))?;
    globals.set("query", query_table.clone()).map_err(|e| runtime_error(location, e))?;
    globals.set("me", me_value.clone()).map_err(|e| runtime_error(location, e))?;
    globals.set("isRoot", ctx.borrow().is_root).map_err(|e| runtime_error(location, e))?;
    globals.set("method", ctx.borrow().method.clone()).map_err(|e| runtime_error(location, e))?;

    let context_table = lua.create_table().map_err(|e| runtime_error(location, e))?;
    context_table.set("data", data_table.clone()).map_err(|e| runtime_error(location, e))?;
    context_table.set("query", query_table.clone()).map_err(|e| runtime_error(location, e))?;
    context_table.set("me", me_value).map_err(|e| runtime_error(location, e))?;
    context_table.set("isRoot", ctx.borrow().is_root).map_err(|e| runtime_error(location, e))?;
    context_table.set("method", ctx.borrow().method.clone()).map_err(|e| runtime_error(location, e))?;
    globals.set("context", context_table.clone()).map_err(|e| runtime_error(location, e))?;

    register_host_functions(&lua, ctx).map_err(|e| runtime_error(location, e))?;

    lua.load(source)
        .set_name(location)
        .exec()
        .map_err(|e| compile_error(location, e))?;

    if let Ok(run_fn) = globals.get::<mlua::Function>("Run") {
        run_fn
            .call::<()>(context_table.clone())
            .map_err(|e| runtime_error(location, e))?;
    }

    let new_data = table_to_json(&data_table).map_err(|e| runtime_error(location, e))?;
    let new_query_json = table_to_json(&query_table).map_err(|e| runtime_error(location, e))?;

    let mut ctx = ctx.borrow_mut();
    ctx.data = new_data.as_object().cloned().unwrap_or_default();
    if let Ok(new_query) = basin_query::parse_query(&new_query_json) {
        ctx.query = new_query;
    }
    Ok(())
}

fn compile_error(location: &str, err: mlua::Error) -> ScriptError {
    ScriptError::CompileFailed { location: location.to_string(), message: err.to_string() }
}

fn runtime_error(location: &str, err: mlua::Error) -> ScriptError {
    ScriptError::Runtime { location: location.to_string(), message: err.to_string() }
}

/// One-time syntax probe used by the cache to detect the free-standing vs.
/// `Run(context)` entry-point shape without running the script for real.
pub fn syntax_check(source: &str, location: &str) -> Result<(), ScriptError> {
    let lua = Lua::new();
    lua.load(source).set_name(location).into_function().map_err(|e| compile_error(location, e))?;
    Ok(())
}

fn register_host_functions(lua: &Lua, ctx: &Rc<RefCell<RequestContext>>) -> mlua::Result<()> {
    let globals = lua.globals();

    let error_ctx = ctx.clone();
    globals.set(
        "error",
        lua.create_function(move |_, (field, message): (String, String)| {
            error_ctx.borrow_mut().record_error(field, message);
            Ok(())
        })?,
    )?;

    let cancel_ctx = ctx.clone();
    globals.set(
        "cancel",
        lua.create_function(move |_, args: MultiValue| {
            let mut iter = args.into_iter();
            let message = match iter.next() {
                Some(LuaValue::String(s)) => s.to_str()?.to_string(),
                _ => "cancelled".to_string(),
            };
            let status = match iter.next() {
                Some(LuaValue::Integer(n)) => Some(n as u16),
                Some(LuaValue::Number(n)) => Some(n as u16),
                _ => None,
            };
            cancel_ctx.borrow_mut().cancel(message, status);
            Ok(())
        })?,
    )?;

    let hide_ctx = ctx.clone();
    globals.set(
        "hide",
        lua.create_function(move |_, fields: Variadic<String>| {
            let mut ctx = hide_ctx.borrow_mut();
            for field in fields {
                ctx.hide(field);
            }
            Ok(())
        })?,
    )?;

    let protect_ctx = ctx.clone();
    globals.set(
        "protect",
        lua.create_function(move |_, fields: Variadic<String>| {
            let mut ctx = protect_ctx.borrow_mut();
            for field in fields {
                ctx.protect(field);
            }
            Ok(())
        })?,
    )?;

    globals.set(
        "log",
        lua.create_function(move |_, message: String| {
            tracing::info!(target: "basin_script::handler", "{message}");
            Ok(())
        })?,
    )?;

    Ok(())
}

fn json_to_lua(lua: &Lua, value: &JsonValue) -> mlua::Result<LuaValue> {
    Ok(match value {
        JsonValue::Null => LuaValue::Nil,
        JsonValue::Bool(b) => LuaValue::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                LuaValue::Integer(i)
            } else {
                LuaValue::Number(n.as_f64().unwrap_or(0.0))
            }
        }
        JsonValue::String(s) => LuaValue::String(lua.create_string(s)?),
        JsonValue::Array(_) | JsonValue::Object(_) => LuaValue::Table(json_to_table(lua, value)?),
    })
}

fn json_to_table(lua: &Lua, value: &JsonValue) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    match value {
        JsonValue::Object(map) => {
            for (key, val) in map {
                table.set(key.as_str(), json_to_lua(lua, val)?)?;
            }
        }
        JsonValue::Array(items) => {
            for (i, val) in items.iter().enumerate() {
                table.set(i + 1, json_to_lua(lua, val)?)?;
            }
        }
        _ => {}
    }
    Ok(table)
}

fn lua_to_json(value: &LuaValue) -> mlua::Result<JsonValue> {
    Ok(match value {
        LuaValue::Nil => JsonValue::Null,
        LuaValue::Boolean(b) => JsonValue::Bool(*b),
        LuaValue::Integer(i) => JsonValue::from(*i),
        LuaValue::Number(n) => serde_json::Number::from_f64(*n).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        LuaValue::String(s) => JsonValue::String(s.to_str()?.to_string()),
        LuaValue::Table(t) => table_to_json(t)?,
        _ => JsonValue::Null,
    })
}

/// A Lua table is an array if every key is a positive integer starting at
/// 1 with no gaps; otherwise it's treated as an object.
fn table_to_json(table: &Table) -> mlua::Result<JsonValue> {
    let len = table.raw_len();
    let is_array = len > 0
        && table
            .clone()
            .pairs::<LuaValue, LuaValue>()
            .count()
            == len;

    if is_array {
        let mut items = Vec::with_capacity(len);
        for i in 1..=len {
            let v: LuaValue = table.get(i)?;
            items.push(lua_to_json(&v)?);
        }
        return Ok(JsonValue::Array(items));
    }

    let mut map = Map::new();
    for pair in table.clone().pairs::<LuaValue, LuaValue>() {
        let (key, value) = pair?;
        let key = match key {
            LuaValue::String(s) => s.to_str()?.to_string(),
            LuaValue::Integer(i) => i.to_string(),
            LuaValue::Number(n) => n.to_string(),
            _ => continue,
        };
        map.insert(key, lua_to_json(&value)?);
    }
    Ok(JsonValue::Object(map))
}
