//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::snapshot_file::{save_state, write_snapshot};
use dapgraph_core::{
    DebugState, Entity, GraphError, Location, ParseError, ParseErrorKind, Pattern, PredicateOp,
    Resolution, Snapshot, ToggleOutcome, Value, View, ViewQuery, Window,
};
use std::path::{Path, PathBuf};

/// Everything a command needs: the loaded state plus global flags.
#[derive(Debug)]
pub struct Context {
    pub state: DebugState,
    pub snapshot: PathBuf,
    pub scope: Option<String>,
    pub json_mode: bool,
    pub default_limit: usize,
}

impl Context {
    fn resolver(&self) -> dapgraph_core::Resolver {
        match &self.scope {
            Some(scope) => self.state.resolver.with_scope(scope.as_str()),
            None => self.state.resolver.clone(),
        }
    }
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// RENDERING
// =============================================================================

pub fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Nil => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(n) => serde_json::Value::from(*n),
        Value::Str(s) => serde_json::Value::String(s.clone()),
    }
}

pub fn entity_json(entity: &Entity) -> serde_json::Value {
    let props: serde_json::Map<String, serde_json::Value> = entity
        .properties()
        .iter()
        .map(|(name, value)| (name.clone(), value_json(value)))
        .collect();
    serde_json::json!({
        "uri": entity.uri().as_str(),
        "kind": entity.kind(),
        "props": props,
    })
}

fn entity_line(entity: &Entity) -> String {
    let props: Vec<String> = entity
        .properties()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    if props.is_empty() {
        format!("{} [{}]", entity.uri(), entity.kind())
    } else {
        format!("{} [{}] {}", entity.uri(), entity.kind(), props.join(" "))
    }
}

// =============================================================================
// RESOLVE / PARSE
// =============================================================================

/// Resolve a pattern; with `all`, print every match.
pub fn cmd_resolve(ctx: &Context, pattern: &str, all: bool) -> Result<(), GraphError> {
    let resolver = ctx.resolver();
    let entities = if all {
        resolver.resolve_all(pattern)?
    } else {
        resolver.resolve_one(pattern)?.into_iter().collect()
    };

    if ctx.json_mode {
        let items: Vec<serde_json::Value> = entities.iter().map(entity_json).collect();
        print_json(&serde_json::json!({
            "pattern": pattern,
            "scope": ctx.scope,
            "count": items.len(),
            "entities": items,
        }));
        return Ok(());
    }

    if entities.is_empty() {
        println!("No match for {pattern}");
    }
    for entity in &entities {
        println!("{}", entity_line(entity));
    }
    Ok(())
}

/// Parse a pattern and print its canonical form.
pub fn cmd_parse(ctx: &Context, pattern: &str) -> Result<(), GraphError> {
    let parsed = Pattern::parse(pattern)?;
    let shape = match ctx.resolver().evaluate(&parsed) {
        Resolution::Single(_) => "single",
        Resolution::List(_) => "list",
    };

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "canonical": parsed.to_string(),
            "result": shape,
            "steps": parsed.steps.len(),
        }));
        return Ok(());
    }

    println!("Canonical: {parsed}");
    println!("Result:    {shape}");
    Ok(())
}

// =============================================================================
// VIEW
// =============================================================================

/// Arguments of the `view` command.
#[derive(Debug, Clone, Default)]
pub struct ViewArgs {
    pub kind: String,
    pub predicates: Vec<String>,
    pub sort: Option<String>,
    pub descending: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// Split `field<op>value` at the earliest operator; at equal positions
/// the two-character operator wins.
pub fn parse_predicate(clause: &str) -> Result<(String, PredicateOp, Value), GraphError> {
    const OPS: [(&str, PredicateOp); 6] = [
        ("!=", PredicateOp::Ne),
        ("<=", PredicateOp::Le),
        (">=", PredicateOp::Ge),
        ("=", PredicateOp::Eq),
        ("<", PredicateOp::Lt),
        (">", PredicateOp::Gt),
    ];
    let earliest = OPS
        .iter()
        .filter_map(|(symbol, op)| clause.find(symbol).map(|pos| (pos, *symbol, *op)))
        .min_by_key(|(pos, symbol, _)| (*pos, std::cmp::Reverse(symbol.len())));
    if let Some((pos, symbol, op)) = earliest {
        let field = clause[..pos].trim();
        let raw = clause[pos + symbol.len()..].trim();
        if !field.is_empty() {
            return Ok((field.to_string(), op, literal(raw)));
        }
    }
    Err(GraphError::Parse(ParseError {
        kind: ParseErrorKind::UnexpectedToken,
        offset: 0,
        found: Some(clause.to_string()),
        message: format!("expected field<op>value, found {clause:?}"),
    }))
}

/// `true`/`false` and integers keep their type; everything else is a string.
fn literal(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or_else(|_| Value::str(raw)),
    }
}

/// Show a window over a filtered, sorted entity list.
pub fn cmd_view(ctx: &Context, args: &ViewArgs) -> Result<(), GraphError> {
    let mut query = ViewQuery::of_kind(args.kind.as_str());
    for clause in &args.predicates {
        let (field, op, value) = parse_predicate(clause)?;
        query = query.filter(field, op, value);
    }
    if let Some(field) = &args.sort {
        query = query.sort_by(field.as_str(), args.descending);
    }
    let window = Window {
        offset: args.offset,
        limit: args.limit.unwrap_or(ctx.default_limit),
    };
    let view = View::new(&ctx.state.store, query, window)?;
    let items = view.items();
    let total = view.visible_total();
    view.dispose();

    if ctx.json_mode {
        let rendered: Vec<serde_json::Value> = items.iter().map(entity_json).collect();
        print_json(&serde_json::json!({
            "kind": args.kind,
            "offset": window.offset,
            "limit": window.limit,
            "total": total,
            "items": rendered,
        }));
        return Ok(());
    }

    let end = window.offset.saturating_add(items.len());
    println!(
        "{} {}..{} of {}",
        args.kind,
        window.offset.min(total),
        end.min(total),
        total
    );
    for entity in &items {
        println!("  {}", entity_line(entity));
    }
    Ok(())
}

// =============================================================================
// STATS
// =============================================================================

/// Show entity and edge counts.
pub fn cmd_stats(ctx: &Context) -> Result<(), GraphError> {
    let store = &ctx.state.store;
    let kinds = store.kind_counts();
    let focused: Vec<String> = ctx
        .state
        .focus
        .focused()
        .iter()
        .map(ToString::to_string)
        .collect();

    if ctx.json_mode {
        let by_kind: serde_json::Map<String, serde_json::Value> = kinds
            .iter()
            .map(|(kind, count)| (kind.clone(), serde_json::Value::from(*count)))
            .collect();
        print_json(&serde_json::json!({
            "snapshot": ctx.snapshot.to_string_lossy(),
            "entity_count": store.len(),
            "edge_count": store.edge_count(),
            "kinds": by_kind,
            "focus": focused,
        }));
        return Ok(());
    }

    println!("dapgraph Snapshot Status");
    println!("========================");
    println!("Snapshot: {:?}", ctx.snapshot);
    println!();
    println!("Entities: {}", store.len());
    println!("Edges:    {}", store.edge_count());
    for (kind, count) in &kinds {
        println!("  {kind:<12} {count}");
    }
    if !focused.is_empty() {
        println!();
        println!("Focus:    {}", focused.join(" > "));
    }
    Ok(())
}

// =============================================================================
// EDITS (saved back into the snapshot)
// =============================================================================

/// Focus an entity (globally, or in `--scope`) and save.
pub fn cmd_focus(ctx: &Context, uri: &str) -> Result<(), GraphError> {
    let focused = match &ctx.scope {
        Some(scope) => ctx.state.focus.focus_in(scope, uri),
        None => ctx.state.focus.focus(uri),
    };
    if focused && ctx.scope.is_none() {
        save_state(&ctx.state, &ctx.snapshot)?;
    }
    if focused && ctx.scope.is_some() {
        tracing::warn!("scoped focus is not saved in snapshots");
    }

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "uri": uri,
            "focused": focused,
            "focus": ctx.state.focus.focused().iter().map(ToString::to_string).collect::<Vec<_>>(),
        }));
        return Ok(());
    }

    if focused {
        println!("Focused {uri}");
    } else {
        println!("{uri} is missing or not a focusable type");
    }
    Ok(())
}

/// Toggle a breakpoint and save.
pub async fn cmd_toggle(
    ctx: &Context,
    path: &str,
    line: u32,
    column: Option<u32>,
) -> Result<(), GraphError> {
    let mut location = Location::new(path, line);
    location.column = column;
    let outcome = ctx.state.breakpoints.toggle(&location).await?;
    if outcome != ToggleOutcome::Rejected {
        save_state(&ctx.state, &ctx.snapshot)?;
    }

    let (action, uri) = match &outcome {
        ToggleOutcome::Added(bp) => ("added", Some(bp.uri().to_string())),
        ToggleOutcome::Removed(uri) => ("removed", Some(uri.to_string())),
        ToggleOutcome::Rejected => ("rejected", None),
    };

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "location": location.to_string(),
            "action": action,
            "uri": uri,
        }));
        return Ok(());
    }

    println!(
        "Breakpoint {action} at {location}{}",
        uri.map(|u| format!(" ({u})")).unwrap_or_default()
    );
    Ok(())
}

/// Write the loaded snapshot to `output`, encoded by its extension.
pub fn cmd_convert(ctx: &Context, output: &Path) -> Result<(), GraphError> {
    let snapshot = Snapshot::capture(&ctx.state.store, Some(&ctx.state.focus));
    write_snapshot(output, &snapshot)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({
            "input": ctx.snapshot.to_string_lossy(),
            "output": output.to_string_lossy(),
            "entities": snapshot.entities.len(),
            "edges": snapshot.edges.len(),
        }));
        return Ok(());
    }

    println!(
        "Wrote {} entities and {} edges to {:?}",
        snapshot.entities.len(),
        snapshot.edges.len(),
        output
    );
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
