//! Query Semantics for the Memory Store
//!
//! Evaluates filters, update operators, projections and sort specifications
//! against BSON documents, following MongoDB behaviour for the parts of the
//! query language the repository uses.
//!
//! ## Supported
//!
//! - Filters: implicit equality, `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
//!   `$in`, `$nin`, `$exists`, and top-level `$or` / `$and` / `$nor`
//! - Updates: `$set`, `$inc`, `$unset`
//! - Projections: exclusion or inclusion, `_id` handled on its own
//! - Sort: any number of keys, BSON type ordering
//!
//! Dotted paths (`requests.pizza`, `numbers.0`) work everywhere. When a path
//! crosses an array without an index, every document element is visited, so
//! `{"items.sku": "A"}` matches if any item has that sku.

use mongodb::bson::{Bson, Document};
use std::cmp::Ordering;

/// Evaluation error, mapped to a store error by the caller.
pub type MatchResult<T> = std::result::Result<T, String>;

/// Most `null` slots an array update may create past the current end.
const MAX_BACKFILL: usize = 1_500_000;

// ============================================================================
// PATHS
// ============================================================================

/// Collects every value reachable through a dotted path.
pub fn resolve_path<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(first) = document.get(parts[0]) {
        collect_path(first, &parts[1..], &mut out);
    }
    out
}

fn collect_path<'a>(value: &'a Bson, parts: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = parts.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Bson::Document(doc) => {
            if let Some(child) = doc.get(*head) {
                collect_path(child, rest, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    collect_path(item, rest, out);
                }
            } else {
                for item in items {
                    if let Bson::Document(doc) = item {
                        if let Some(child) = doc.get(*head) {
                            collect_path(child, rest, out);
                        }
                    }
                }
            }
        }
        _ => {}
    }
}

/// Single-valued lookup used by updates: arrays are only entered by index.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(doc) => doc.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Writes `value` at a dotted path, creating intermediate documents.
pub fn set_path(document: &mut Document, path: &str, value: Bson) -> MatchResult<()> {
    let parts: Vec<&str> = path.split('.').collect();
    set_in_document(document, &parts, value)
}

fn set_in_document(document: &mut Document, parts: &[&str], value: Bson) -> MatchResult<()> {
    let (head, rest) = (parts[0], &parts[1..]);
    if rest.is_empty() {
        document.insert(head, value);
        return Ok(());
    }
    if document.get(head).is_none() {
        document.insert(head, Document::new());
    }
    match document.get_mut(head) {
        Some(child) => set_in_value(child, rest, value),
        None => Ok(()),
    }
}

fn set_in_value(target: &mut Bson, parts: &[&str], value: Bson) -> MatchResult<()> {
    match target {
        Bson::Document(doc) => set_in_document(doc, parts, value),
        Bson::Array(items) => {
            let index: usize = parts[0]
                .parse()
                .map_err(|_| format!("Cannot create field '{}' in an array", parts[0]))?;
            if index >= items.len() {
                if index - items.len() > MAX_BACKFILL {
                    return Err(format!(
                        "can't backfill more than {} elements",
                        MAX_BACKFILL
                    ));
                }
                items.resize(index + 1, Bson::Null);
            }
            if parts.len() == 1 {
                items[index] = value;
                return Ok(());
            }
            if matches!(items[index], Bson::Null) {
                items[index] = Bson::Document(Document::new());
            }
            set_in_value(&mut items[index], &parts[1..], value)
        }
        other => Err(format!(
            "Cannot create field '{}' in element {{{}}}",
            parts[0], other
        )),
    }
}

/// Removes the value at a dotted path. Array slots are nulled, not shifted.
pub fn remove_path(document: &mut Document, path: &str) -> bool {
    let parts: Vec<&str> = path.split('.').collect();
    remove_in_document(document, &parts)
}

fn remove_in_document(document: &mut Document, parts: &[&str]) -> bool {
    let (head, rest) = (parts[0], &parts[1..]);
    if rest.is_empty() {
        return document.remove(head).is_some();
    }
    match document.get_mut(head) {
        Some(Bson::Document(child)) => remove_in_document(child, rest),
        Some(Bson::Array(items)) => {
            let Ok(index) = rest[0].parse::<usize>() else {
                return false;
            };
            match items.get_mut(index) {
                Some(slot) if rest.len() == 1 => {
                    *slot = Bson::Null;
                    true
                }
                Some(Bson::Document(child)) => remove_in_document(child, &rest[1..]),
                _ => false,
            }
        }
        _ => false,
    }
}

// ============================================================================
// COMPARISON
// ============================================================================

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn as_integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

/// Numeric comparison. Two integers compare exactly; `f64` only when a
/// `Double` is involved.
fn compare_numbers(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_integer(a), as_integer(b)) {
        return Some(x.cmp(&y));
    }
    let (x, y) = (as_number(a)?, as_number(b)?);
    Some(x.partial_cmp(&y).unwrap_or(Ordering::Equal))
}

/// Position of a value's type in MongoDB's cross-type sort order.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 255,
        _ => 12,
    }
}

/// Equality with numeric values compared across Int32/Int64/Double.
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    if let Some(ordering) = compare_numbers(a, b) {
        return ordering == Ordering::Equal;
    }
    match (a, b) {
        (Bson::Document(x), Bson::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(va, vb)| values_equal(va, vb))
        }
        (Bson::Null | Bson::Undefined, Bson::Null | Bson::Undefined) => true,
        _ => a == b,
    }
}

/// Total order over BSON values, types first, then values.
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }

    match (a, b) {
        _ if compare_numbers(a, b).is_some() => compare_numbers(a, b).unwrap_or(Ordering::Equal),
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Document(x), Bson::Document(y)) => {
            for ((ka, va), (kb, vb)) in x.iter().zip(y.iter()) {
                let ordering = compare_values(va, vb).then_with(|| ka.cmp(kb));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::Array(x), Bson::Array(y)) => {
            for (va, vb) in x.iter().zip(y.iter()) {
                let ordering = compare_values(va, vb);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        _ => Ordering::Equal,
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        other => as_number(other).map(|n| n != 0.0).unwrap_or(true),
    }
}

// ============================================================================
// FILTERS
// ============================================================================

/// Returns whether `document` satisfies `filter`.
pub fn matches(document: &Document, filter: &Document) -> MatchResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$or" => clauses(key, condition)?
                .iter()
                .try_fold(false, |any, clause| Ok::<_, String>(any || matches(document, clause)?))?,
            "$and" => clauses(key, condition)?
                .iter()
                .try_fold(true, |all, clause| Ok::<_, String>(all && matches(document, clause)?))?,
            "$nor" => !clauses(key, condition)?
                .iter()
                .try_fold(false, |any, clause| Ok::<_, String>(any || matches(document, clause)?))?,
            op if op.starts_with('$') => {
                return Err(format!("unknown top level operator: {}", op));
            }
            path => field_matches(&resolve_path(document, path), condition)?,
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(operator: &str, condition: &'a Bson) -> MatchResult<Vec<&'a Document>> {
    let Bson::Array(items) = condition else {
        return Err(format!("{} must be an array", operator));
    };
    if items.is_empty() {
        return Err(format!("{} argument must be a non-empty array", operator));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Ok(doc),
            _ => Err(format!("{} argument's entries must be objects", operator)),
        })
        .collect()
}

/// `Some` for an all-operator condition, `None` for a literal value. A
/// document mixing operators and plain fields is rejected.
fn operator_document(condition: &Bson) -> MatchResult<Option<&Document>> {
    let Bson::Document(doc) = condition else {
        return Ok(None);
    };
    let operators = doc.keys().filter(|k| k.starts_with('$')).count();
    match operators {
        0 => Ok(None),
        n if n == doc.len() => Ok(Some(doc)),
        _ => Err(format!(
            "cannot mix operators and fields in a condition: {}",
            condition
        )),
    }
}

fn field_matches(values: &[&Bson], condition: &Bson) -> MatchResult<bool> {
    let Some(operators) = operator_document(condition)? else {
        return Ok(equals_any(values, condition));
    };

    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            "$eq" => equals_any(values, operand),
            "$ne" => !equals_any(values, operand),
            "$gt" => compares_any(values, operand, |o| o == Ordering::Greater),
            "$gte" => compares_any(values, operand, |o| o != Ordering::Less),
            "$lt" => compares_any(values, operand, |o| o == Ordering::Less),
            "$lte" => compares_any(values, operand, |o| o != Ordering::Greater),
            "$in" => in_list(values, operator, operand)?,
            "$nin" => !in_list(values, operator, operand)?,
            "$exists" => values.is_empty() != is_truthy(operand),
            other => return Err(format!("unknown operator: {}", other)),
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Equality against each value and, for arrays, each of their elements.
fn equals_any(values: &[&Bson], expected: &Bson) -> bool {
    if values.is_empty() {
        return matches!(expected, Bson::Null);
    }
    values.iter().copied().any(|value| {
        values_equal(value, expected)
            || matches!(value, Bson::Array(items) if items.iter().any(|i| values_equal(i, expected)))
    })
}

fn compares_any(values: &[&Bson], operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let check = |value: &Bson| {
        type_rank(value) == type_rank(operand) && accept(compare_values(value, operand))
    };
    values.iter().copied().any(|value| match value {
        Bson::Array(items) => check(value) || items.iter().any(&check),
        _ => check(value),
    })
}

fn in_list(values: &[&Bson], operator: &str, operand: &Bson) -> MatchResult<bool> {
    let Bson::Array(candidates) = operand else {
        return Err(format!("{} needs an array", operator));
    };
    Ok(candidates.iter().any(|candidate| equals_any(values, candidate)))
}

// ============================================================================
// UPDATES
// ============================================================================

/// Checks an update document before it touches any data.
pub fn validate_update(update: &Document) -> MatchResult<()> {
    if update.is_empty() {
        return Err("Update document requires atomic operators".to_string());
    }
    for (operator, operand) in update {
        if !matches!(operator.as_str(), "$set" | "$inc" | "$unset") {
            if operator.starts_with('$') {
                return Err(format!("Unknown modifier: {}", operator));
            }
            return Err("Update document requires atomic operators".to_string());
        }
        let Bson::Document(fields) = operand else {
            return Err(format!(
                "Modifiers operate on fields but we found type {:?} instead",
                operand.element_type()
            ));
        };
        for (path, value) in fields {
            if path == "_id" || path.starts_with("_id.") {
                return Err(format!(
                    "Performing an update on the path '{}' would modify the immutable field '_id'",
                    path
                ));
            }
            if operator == "$inc" && as_number(value).is_none() {
                return Err(format!(
                    "Cannot increment with non-numeric argument: {{{}: {}}}",
                    path, value
                ));
            }
        }
    }
    Ok(())
}

/// Applies a validated update; returns whether the document changed.
pub fn apply_update(document: &mut Document, update: &Document) -> MatchResult<bool> {
    let mut changed = false;

    for (operator, operand) in update {
        let Bson::Document(fields) = operand else {
            continue;
        };
        for (path, value) in fields {
            match operator.as_str() {
                "$set" => {
                    if get_path(document, path) != Some(value) {
                        set_path(document, path, value.clone())?;
                        changed = true;
                    }
                }
                "$inc" => {
                    let next = match get_path(document, path) {
                        None => value.clone(),
                        Some(current) => add_numbers(current, value).ok_or_else(|| {
                            if as_number(current).is_some() {
                                format!(
                                    "Failed to apply $inc operations to current value ({}) for document {{_id: {}}}: integer overflow",
                                    current,
                                    document.get("_id").cloned().unwrap_or(Bson::Null)
                                )
                            } else {
                                format!(
                                    "Cannot apply $inc to a value of non-numeric type. {{_id: {}}} has the field '{}' of non-numeric type {:?}",
                                    document.get("_id").cloned().unwrap_or(Bson::Null),
                                    path,
                                    current.element_type()
                                )
                            }
                        })?,
                    };
                    if get_path(document, path) != Some(&next) {
                        set_path(document, path, next)?;
                        changed = true;
                    }
                }
                "$unset" => changed |= remove_path(document, path),
                _ => {}
            }
        }
    }

    Ok(changed)
}

/// Numeric addition with MongoDB type promotion. `None` for a non-numeric
/// operand or a 64-bit overflow.
fn add_numbers(current: &Bson, delta: &Bson) -> Option<Bson> {
    match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => Some(
            a.checked_add(*b)
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(*a as i64 + *b as i64)),
        ),
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            as_integer(current)?.checked_add(as_integer(delta)?).map(Bson::Int64)
        }
        _ => Some(Bson::Double(as_number(current)? + as_number(delta)?)),
    }
}

// ============================================================================
// PROJECTION AND SORT
// ============================================================================

/// Applies a projection document.
pub fn project(document: &Document, projection: &Document) -> Document {
    let include_id = projection.get("_id").map(is_truthy).unwrap_or(true);
    let fields: Vec<(&str, bool)> = projection
        .iter()
        .filter(|(key, _)| key.as_str() != "_id")
        .map(|(key, value)| (key.as_str(), is_truthy(value)))
        .collect();
    let inclusion = fields.iter().any(|(_, include)| *include);

    let mut projected = if inclusion {
        let paths: Vec<Vec<&str>> = fields
            .iter()
            .filter(|(_, include)| *include)
            .map(|(path, _)| path.split('.').collect())
            .collect();
        let mut kept = Document::new();
        if let Some(id) = document.get("_id") {
            kept.insert("_id", id.clone());
        }
        for (key, value) in include_paths(document, &paths) {
            kept.insert(key, value);
        }
        kept
    } else {
        let mut kept = document.clone();
        for (path, _) in &fields {
            remove_path(&mut kept, path);
        }
        kept
    };

    if !include_id {
        projected.remove("_id");
    }
    projected
}

fn include_paths(document: &Document, paths: &[Vec<&str>]) -> Document {
    let mut kept = Document::new();
    for (key, value) in document {
        let relevant: Vec<&Vec<&str>> = paths.iter().filter(|p| p[0] == key.as_str()).collect();
        if relevant.is_empty() {
            continue;
        }
        if relevant.iter().any(|p| p.len() == 1) {
            kept.insert(key.clone(), value.clone());
        } else if let Bson::Document(child) = value {
            let rests: Vec<Vec<&str>> = relevant.iter().map(|p| p[1..].to_vec()).collect();
            let nested = include_paths(child, &rests);
            if !nested.is_empty() {
                kept.insert(key.clone(), nested);
            }
        }
    }
    kept
}

/// Key a document sorts by for one sort field. Arrays sort by their
/// smallest element ascending and their largest descending.
fn sort_key(document: &Document, path: &str, descending: bool) -> Bson {
    let mut candidates: Vec<&Bson> = Vec::new();
    for value in resolve_path(document, path) {
        match value {
            Bson::Array(items) if !items.is_empty() => candidates.extend(items.iter()),
            other => candidates.push(other),
        }
    }
    let pick = if descending {
        candidates.into_iter().max_by(|a, b| compare_values(a, b))
    } else {
        candidates.into_iter().min_by(|a, b| compare_values(a, b))
    };
    pick.cloned().unwrap_or(Bson::Null)
}

/// Parses a sort document into `(path, descending)` pairs.
pub fn sort_fields(sort: &Document) -> MatchResult<Vec<(String, bool)>> {
    sort.iter()
        .map(|(path, direction)| match as_number(direction) {
            Some(d) if d == 1.0 => Ok((path.clone(), false)),
            Some(d) if d == -1.0 => Ok((path.clone(), true)),
            _ => Err(format!("$sort key ordering must be 1 (for ascending) or -1 (for descending): {}", path)),
        })
        .collect()
}

/// Stable multi-key sort.
pub fn sort_documents(documents: &mut [Document], fields: &[(String, bool)]) {
    documents.sort_by(|a, b| {
        for (path, descending) in fields {
            let ordering = compare_values(
                &sort_key(a, path, *descending),
                &sort_key(b, path, *descending),
            );
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
