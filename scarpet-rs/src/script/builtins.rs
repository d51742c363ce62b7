//! Standard operators, functions and constants.
//!
//! Everything here goes through the same registration API a host uses
//! ([`Interpreter::register_operator`], [`Interpreter::register_function`],
//! ...).  Functions that only need their arguments' values are registered
//! through [`register_eager`]; control-flow functions receive the raw
//! [`LazyValue`]s and decide themselves what to evaluate and how often.
//!
//! Loop builtins bind `_` (and `_i` for list iteration) in the caller's
//! scope, restoring the previous bindings when the loop ends for any reason.
//! Each iteration head checks for cancellation.

use std::rc::Rc;
use std::time::Duration;

use super::context::Context;
use super::error::{EvalResult, ScriptError};
use super::interp::{Arity, Assoc, Interpreter};
use super::lazy::LazyValue;
use super::value::{checked, parse_number, LazyList, Value, ValueData};

pub fn install(interp: &mut Interpreter) {
    install_operators(interp);
    install_control(interp);
    install_lists(interp);
    install_values(interp);
    install_math(interp);
    install_strings(interp);
    install_constants(interp);
}

// ── Registration helpers ──────────────────────────────────────────────────────

/// Register a function whose arguments are all forced, left to right,
/// before `f` runs.
pub fn register_eager<F>(interp: &mut Interpreter, name: &str, arity: Arity, f: F)
where
    F: Fn(&Interpreter, &[Value]) -> Result<Value, ScriptError> + 'static,
{
    interp.register_function(name, arity, move |ctx, _, args| {
        let values = args.iter().map(|a| a.eval(ctx)).collect::<EvalResult<Vec<_>>>()?;
        let interp = ctx.interpreter().clone();
        Ok(LazyValue::of(f(&interp, &values)?))
    });
}

fn math1(interp: &mut Interpreter, name: &'static str, f: fn(f64) -> f64) {
    register_eager(interp, name, Arity::Fixed(1), move |_, a| checked(f(a[0].to_number(name)?), name));
}

fn arithmetic(
    interp: &mut Interpreter,
    name: &str,
    precedence: u16,
    assoc: Assoc,
    f: fn(&Value, &Value) -> Result<Value, ScriptError>,
) {
    interp.register_operator(name, precedence, assoc, move |ctx, _, a, b| {
        let (a, b) = (a.eval(ctx)?, b.eval(ctx)?);
        Ok(f(&a, &b)?)
    });
}

fn comparison(interp: &mut Interpreter, name: &str, precedence: u16, f: fn(&Value, &Value) -> bool) {
    interp.register_operator(name, precedence, Assoc::Left, move |ctx, _, a, b| {
        let (a, b) = (a.eval(ctx)?, b.eval(ctx)?);
        Ok(Value::boolean(f(&a, &b)))
    });
}

fn bind(name: &Rc<str>, value: Value) -> LazyValue {
    LazyValue::of(value.bind_to(name.clone()))
}

fn too_many(name: &str, max: usize, got: usize) -> ScriptError {
    ScriptError::internal(format!("Function '{name}' takes at most {max} arguments, got {got}"))
}

// ── Operators ─────────────────────────────────────────────────────────────────

fn install_operators(interp: &mut Interpreter) {
    interp.register_operator(":", 80, Assoc::Left, |ctx, _, a, b| {
        let (a, b) = (a.eval(ctx)?, b.eval(ctx)?);
        Ok(element_at(&a, &b)?)
    });
    interp.register_operator("~", 80, Assoc::Left, |ctx, _, a, b| {
        let (a, b) = (a.eval(ctx)?, b.eval(ctx)?);
        Ok(match_value(ctx.interpreter(), &a, &b)?)
    });

    interp.register_unary_operator("-", 60, |ctx, _, v| Ok(v.eval(ctx)?.neg()?));
    interp.register_unary_operator("+", 60, |ctx, _, v| {
        let v = v.eval(ctx)?;
        match v.data() {
            ValueData::List(_) => Ok(v.unbound()),
            _ => Ok(Value::number(v.to_number("+")?)),
        }
    });
    interp.register_unary_operator("!", 60, |ctx, _, v| Ok(Value::boolean(!v.eval_bool(ctx)?)));

    arithmetic(interp, "^", 40, Assoc::Right, Value::pow);
    arithmetic(interp, "*", 30, Assoc::Left, Value::mul);
    arithmetic(interp, "/", 30, Assoc::Left, Value::div);
    arithmetic(interp, "%", 30, Assoc::Left, Value::rem);
    arithmetic(interp, "+", 20, Assoc::Left, Value::add);
    arithmetic(interp, "-", 20, Assoc::Left, Value::sub);

    comparison(interp, ">", 10, |a, b| a.compare(b).is_gt());
    comparison(interp, ">=", 10, |a, b| a.compare(b).is_ge());
    comparison(interp, "<", 10, |a, b| a.compare(b).is_lt());
    comparison(interp, "<=", 10, |a, b| a.compare(b).is_le());
    comparison(interp, "==", 7, |a, b| a.equals(b));
    comparison(interp, "!=", 7, |a, b| !a.equals(b));

    interp.register_operator("&&", 5, Assoc::Left, |ctx, _, a, b| {
        Ok(Value::boolean(a.eval_bool(ctx)? && b.eval_bool(ctx)?))
    });
    interp.register_operator("||", 4, Assoc::Left, |ctx, _, a, b| {
        Ok(Value::boolean(a.eval_bool(ctx)? || b.eval_bool(ctx)?))
    });

    interp.register_assignment_operator("=", 3, |ctx, _, t, v| {
        let target = t.eval(ctx)?;
        let value = v.eval(ctx)?.unbound();
        assign(ctx, &target, value)
    });
    interp.register_assignment_operator("+=", 3, |ctx, _, t, v| {
        let target = t.eval(ctx)?;
        let sum = target.add(&v.eval(ctx)?)?;
        assign(ctx, &target, sum)
    });
    interp.register_assignment_operator("<>", 3, |ctx, _, t, v| {
        let (a, b) = (t.eval(ctx)?, v.eval(ctx)?);
        let (Some(left), Some(right)) = (a.binding().cloned(), b.binding().cloned()) else {
            return Err(ScriptError::internal("'<>' needs a variable on both sides").into());
        };
        ctx.set_variable(&left, bind(&left, b.clone()));
        ctx.set_variable(&right, bind(&right, a));
        Ok(b.bind_to(left))
    });
}

/// Store `value` into whatever `target` was read from.  A list of bound
/// values destructures a list of the same length.
fn assign(ctx: &mut Context, target: &Value, value: Value) -> EvalResult<Value> {
    if let Some(name) = target.binding() {
        ctx.set_variable(name, bind(name, value.clone()));
        return Ok(value);
    }
    match (target.data(), value.data()) {
        (ValueData::List(targets), ValueData::List(values)) => {
            if targets.len() != values.len() {
                return Err(ScriptError::internal(format!(
                    "cannot unpack {} values into {} variables",
                    values.len(),
                    targets.len()
                ))
                .into());
            }
            for (t, v) in targets.iter().zip(values.iter()) {
                assign(ctx, t, v.clone().unbound())?;
            }
            Ok(value)
        }
        _ => Err(ScriptError::internal(format!("cannot assign to '{target}', it is not a variable")).into()),
    }
}

fn wrap_index(len: usize, index: f64) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some((index.floor() as i64).rem_euclid(len as i64) as usize)
}

/// `list:i` and `element(list, i)`: indices wrap around, so `-1` is the
/// last element.
fn element_at(v: &Value, index: &Value) -> Result<Value, ScriptError> {
    let i = index.to_number(":")?;
    match v.data() {
        ValueData::List(items) => Ok(wrap_index(items.len(), i).map(|k| items[k].clone()).unwrap_or_default()),
        ValueData::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(wrap_index(chars.len(), i)
                .map(|k| Value::string(chars[k].to_string()))
                .unwrap_or_default())
        }
        ValueData::Iter(_) if i >= 0.0 => Ok(v.iter_values()?.nth(i as usize).unwrap_or_default()),
        _ => Err(ScriptError::internal(format!("cannot index {} '{v}' with {i}", v.type_name()))),
    }
}

/// `a ~ b`: position of `b` in list `a`, or the first regex match (first
/// capture group if the pattern has one) of `b` in the text of `a`.
fn match_value(interp: &Interpreter, a: &Value, b: &Value) -> Result<Value, ScriptError> {
    if let Some(items) = a.as_list() {
        return Ok(items
            .iter()
            .position(|x| x.equals(b))
            .map(|i| Value::number(i as f64))
            .unwrap_or_default());
    }
    let text = a.to_string();
    let re = interp.regex(&b.to_string())?;
    let Some(caps) = re.captures(&text) else {
        return Ok(Value::null());
    };
    let group = if caps.len() > 1 { caps.get(1) } else { caps.get(0) };
    Ok(group.map(|m| Value::string(m.as_str())).unwrap_or_default())
}

// ── Control flow ──────────────────────────────────────────────────────────────

/// Walk `list`, binding `_` and `_i` for each element.  `f` returns `false`
/// to stop early.
fn each<F>(ctx: &mut Context, list: &LazyValue, mut f: F) -> EvalResult<()>
where
    F: FnMut(&mut Context, Value) -> EvalResult<bool>,
{
    let values = list.eval(ctx)?.iter_values()?;
    let (us, ui): (Rc<str>, Rc<str>) = ("_".into(), "_i".into());
    ctx.scoped(&["_", "_i"], |ctx| {
        for (i, v) in values.enumerate() {
            ctx.check_cancelled()?;
            ctx.set_variable("_", bind(&us, v.clone()));
            ctx.set_variable("_i", bind(&ui, Value::number(i as f64)));
            if !f(ctx, v)? {
                break;
            }
        }
        Ok(())
    })
}

fn install_control(interp: &mut Interpreter) {
    // if(cond, then, cond2, then2, ..., else)
    interp.register_function("if", Arity::AtLeast(2), |ctx, _, args| {
        for pair in args.chunks(2) {
            match pair {
                [cond, then] => {
                    if cond.eval_bool(ctx)? {
                        return Ok(then.clone());
                    }
                }
                [otherwise] => return Ok(otherwise.clone()),
                _ => {}
            }
        }
        Ok(LazyValue::null())
    });

    interp.register_function("loop", Arity::Fixed(2), |ctx, kind, args| {
        let n = args[0].eval(ctx)?.to_number("loop")?;
        let us: Rc<str> = "_".into();
        let last = ctx.scoped(&["_"], |ctx| {
            let mut last = Value::null();
            for i in 0..n.max(0.0) as i64 {
                ctx.check_cancelled()?;
                ctx.set_variable("_", bind(&us, Value::number(i as f64)));
                last = args[1].eval_as(ctx, kind)?;
            }
            Ok(last)
        })?;
        Ok(LazyValue::of(last))
    });

    interp.register_function("while", Arity::Fixed(3), |ctx, kind, args| {
        let limit = args[1].eval(ctx)?.to_number("while")?;
        let us: Rc<str> = "_".into();
        let last = ctx.scoped(&["_"], |ctx| {
            let mut last = Value::null();
            for i in 0..limit.max(0.0) as i64 {
                ctx.check_cancelled()?;
                ctx.set_variable("_", bind(&us, Value::number(i as f64)));
                if !args[0].eval_bool(ctx)? {
                    break;
                }
                last = args[2].eval_as(ctx, kind)?;
            }
            Ok(last)
        })?;
        Ok(LazyValue::of(last))
    });

    // Count of elements for which the body is true.
    interp.register_function("for", Arity::Fixed(2), |ctx, _, args| {
        let mut count = 0usize;
        each(ctx, &args[0], |ctx, _| {
            if args[1].eval_bool(ctx)? {
                count += 1;
            }
            Ok(true)
        })?;
        Ok(LazyValue::of(Value::number(count as f64)))
    });

    interp.register_function("map", Arity::Fixed(2), |ctx, _, args| {
        let mut out = Vec::new();
        each(ctx, &args[0], |ctx, _| {
            out.push(args[1].eval(ctx)?.unbound());
            Ok(true)
        })?;
        Ok(LazyValue::of(Value::list(out)))
    });

    interp.register_function("filter", Arity::Fixed(2), |ctx, _, args| {
        let mut out = Vec::new();
        each(ctx, &args[0], |ctx, v| {
            if args[1].eval_bool(ctx)? {
                out.push(v);
            }
            Ok(true)
        })?;
        Ok(LazyValue::of(Value::list(out)))
    });

    interp.register_function("first", Arity::Fixed(2), |ctx, _, args| {
        let mut found = Value::null();
        each(ctx, &args[0], |ctx, v| {
            if args[1].eval_bool(ctx)? {
                found = v;
                return Ok(false);
            }
            Ok(true)
        })?;
        Ok(LazyValue::of(found))
    });

    interp.register_function("all", Arity::Fixed(2), |ctx, _, args| {
        let mut all = true;
        each(ctx, &args[0], |ctx, _| {
            all = args[1].eval_bool(ctx)?;
            Ok(all)
        })?;
        Ok(LazyValue::of(Value::boolean(all)))
    });

    // volume(x1, y1, z1, x2, y2, z2, expr): count of positions in the box
    // for which expr is true, with `_x`, `_y`, `_z` and `_` bound.
    interp.register_function("volume", Arity::Fixed(7), |ctx, _, args| {
        let mut corners = [0i64; 6];
        for (slot, arg) in corners.iter_mut().zip(args) {
            *slot = arg.eval(ctx)?.to_number("volume")?.floor() as i64;
        }
        let [x1, y1, z1, x2, y2, z2] = corners;
        let names: [Rc<str>; 4] = ["_x".into(), "_y".into(), "_z".into(), "_".into()];
        let count = ctx.scoped(&["_x", "_y", "_z", "_"], |ctx| {
            let mut count = 0usize;
            for x in x1.min(x2)..=x1.max(x2) {
                for y in y1.min(y2)..=y1.max(y2) {
                    for z in z1.min(z2)..=z1.max(z2) {
                        ctx.check_cancelled()?;
                        let coords = [x, y, z].map(|c| Value::number(c as f64));
                        for (name, c) in names.iter().zip(&coords) {
                            ctx.set_variable(name, bind(name, c.clone()));
                        }
                        ctx.set_variable("_", bind(&names[3], Value::list(coords.to_vec())));
                        if args[6].eval_bool(ctx)? {
                            count += 1;
                        }
                    }
                }
            }
            Ok(count)
        })?;
        Ok(LazyValue::of(Value::number(count as f64)))
    });

    interp.register_function("call", Arity::AtLeast(1), |ctx, kind, args| {
        let name = args[0].eval(ctx)?.to_string();
        let Some(f) = ctx.interpreter().procedure(&name) else {
            return Err(ScriptError::internal(format!("Function '{name}' is not defined")).into());
        };
        Ok(LazyValue::of(f.call(ctx, &args[1..], kind)?))
    });

    // game_tick([ms]): let the host run one tick, then stop if cancelled.
    interp.register_function("game_tick", Arity::Variadic, |ctx, _, args| {
        if args.len() > 1 {
            return Err(too_many("game_tick", 1, args.len()).into());
        }
        let budget = match args.first() {
            Some(ms) => Some(Duration::from_millis(ms.eval(ctx)?.to_number("game_tick")?.max(0.0) as u64)),
            None => None,
        };
        let interp = ctx.interpreter().clone();
        interp.control().yield_point(budget)?;
        Ok(LazyValue::of(Value::boolean(true)))
    });
}

// ── Lists ─────────────────────────────────────────────────────────────────────

fn install_lists(interp: &mut Interpreter) {
    register_eager(interp, "l", Arity::Variadic, |_, a| Ok(Value::list(a.to_vec())));

    // range(to), range(from, to), range(from, to, step): restartable.
    register_eager(interp, "range", Arity::AtLeast(1), |_, a| {
        if a.len() > 3 {
            return Err(too_many("range", 3, a.len()));
        }
        let nums = a.iter().map(|v| v.to_number("range")).collect::<Result<Vec<_>, _>>()?;
        let (from, to, step) = match nums[..] {
            [to] => (0.0, to, 1.0),
            [from, to] => (from, to, 1.0),
            [from, to, step] => (from, to, step),
            _ => (0.0, 0.0, 1.0),
        };
        if step == 0.0 {
            return Err(ScriptError::arithmetic("range step cannot be zero"));
        }
        Ok(Value::iter(LazyList::restartable(move || {
            let mut cur = from;
            Box::new(std::iter::from_fn(move || {
                if (step > 0.0 && cur < to) || (step < 0.0 && cur > to) {
                    let v = cur;
                    cur += step;
                    Some(Value::number(v))
                } else {
                    None
                }
            }))
        })))
    });

    register_eager(interp, "element", Arity::Fixed(2), |_, a| element_at(&a[0], &a[1]));

    register_eager(interp, "length", Arity::Fixed(1), |_, a| {
        let n = match a[0].data() {
            ValueData::List(items) => items.len(),
            ValueData::Iter(_) => a[0].iter_values()?.count(),
            ValueData::Null => 0,
            _ => a[0].to_string().chars().count(),
        };
        Ok(Value::number(n as f64))
    });

    // slice(list_or_string, from, to?): negative indices count from the end.
    register_eager(interp, "slice", Arity::AtLeast(2), |_, a| {
        if a.len() > 3 {
            return Err(too_many("slice", 3, a.len()));
        }
        let clamp = |len: usize, v: &Value| -> Result<usize, ScriptError> {
            let i = v.to_number("slice")?.floor() as i64;
            let i = if i < 0 { i + len as i64 } else { i };
            Ok(i.clamp(0, len as i64) as usize)
        };
        match a[0].data() {
            ValueData::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let from = clamp(chars.len(), &a[1])?;
                let to = a.get(2).map_or(Ok(chars.len()), |v| clamp(chars.len(), v))?;
                Ok(Value::string(chars[from..to.max(from)].iter().collect::<String>()))
            }
            _ => {
                let items = a[0].to_list()?;
                let from = clamp(items.len(), &a[1])?;
                let to = a.get(2).map_or(Ok(items.len()), |v| clamp(items.len(), v))?;
                Ok(Value::list(items[from..to.max(from)].to_vec()))
            }
        }
    });

    register_eager(interp, "sort", Arity::Fixed(1), |_, a| {
        let mut items = a[0].to_list()?;
        items.sort_by(|x, y| x.compare(y));
        Ok(Value::list(items))
    });

    // join(sep, list) or join(sep, a, b, ...)
    register_eager(interp, "join", Arity::AtLeast(2), |_, a| {
        let sep = a[0].to_string();
        let items = match (a.len(), a[1].data()) {
            (2, ValueData::List(_) | ValueData::Iter(_)) => a[1].to_list()?,
            _ => a[1..].to_vec(),
        };
        let parts: Vec<String> = items.iter().map(Value::to_string).collect();
        Ok(Value::string(parts.join(&sep)))
    });

    // split(regex, text)
    register_eager(interp, "split", Arity::Fixed(2), |interp, a| {
        let re = interp.regex(&a[0].to_string())?;
        let text = a[1].to_string();
        Ok(Value::list(re.split(&text).map(Value::string).collect()))
    });
}

// ── Values and variables ──────────────────────────────────────────────────────

fn install_values(interp: &mut Interpreter) {
    // var(name): the variable itself, usable as an assignment target.
    interp.register_function("var", Arity::Fixed(1), |ctx, _, args| {
        let name = args[0].eval(ctx)?.to_string();
        let binding: Rc<str> = name.as_str().into();
        let value = match ctx.get_variable(&name) {
            Some(v) => v.eval(ctx)?,
            None => Value::null(),
        };
        Ok(bind(&binding, value))
    });

    // undef(name): forget a procedure and a variable of that name.
    interp.register_function("undef", Arity::Fixed(1), |ctx, _, args| {
        let name = args[0].eval(ctx)?.to_string();
        let proc_removed = ctx.interpreter().undefine_procedure(&name);
        let var_removed = ctx.del_variable(&name);
        Ok(LazyValue::of(Value::boolean(proc_removed || var_removed)))
    });

    interp.register_function("print", Arity::Fixed(1), |ctx, _, args| {
        let v = args[0].eval(ctx)?;
        ctx.interpreter().print(v.to_string());
        Ok(LazyValue::of(v))
    });

    register_eager(interp, "type", Arity::Fixed(1), |_, a| Ok(Value::string(a[0].type_name())));
    register_eager(interp, "str", Arity::Fixed(1), |_, a| Ok(Value::string(a[0].to_string())));
    register_eager(interp, "number", Arity::Fixed(1), |_, a| {
        Ok(match a[0].data() {
            ValueData::Number(_) => a[0].clone().unbound(),
            ValueData::Str(s) => parse_number(s).map(Value::number).unwrap_or_default(),
            _ => Value::null(),
        })
    });
    register_eager(interp, "bool", Arity::Fixed(1), |_, a| {
        Ok(Value::boolean(match a[0].as_str() {
            Some(s) => !(s.is_empty() || s.eq_ignore_ascii_case("false") || s == "null"),
            None => a[0].as_bool(),
        }))
    });
    interp.register_function("not", Arity::Fixed(1), |ctx, _, args| {
        Ok(LazyValue::of(Value::boolean(!args[0].eval_bool(ctx)?)))
    });
}

// ── Math ──────────────────────────────────────────────────────────────────────

fn install_math(interp: &mut Interpreter) {
    math1(interp, "sqrt", f64::sqrt);
    math1(interp, "abs", f64::abs);
    math1(interp, "floor", f64::floor);
    math1(interp, "ceil", f64::ceil);
    math1(interp, "round", f64::round);
    math1(interp, "ln", f64::ln);
    math1(interp, "log10", f64::log10);
    math1(interp, "exp", f64::exp);
    // Trigonometry works in degrees.
    math1(interp, "sin", |x| x.to_radians().sin());
    math1(interp, "cos", |x| x.to_radians().cos());
    math1(interp, "tan", |x| x.to_radians().tan());
    math1(interp, "asin", |x| x.asin().to_degrees());
    math1(interp, "acos", |x| x.acos().to_degrees());
    math1(interp, "atan", |x| x.atan().to_degrees());
    register_eager(interp, "atan2", Arity::Fixed(2), |_, a| {
        let (y, x) = (a[0].to_number("atan2")?, a[1].to_number("atan2")?);
        checked(y.atan2(x).to_degrees(), "atan2")
    });

    register_eager(interp, "min", Arity::AtLeast(1), |_, a| {
        Ok(a.iter().min_by(|x, y| x.compare(y)).cloned().unwrap_or_default().unbound())
    });
    register_eager(interp, "max", Arity::AtLeast(1), |_, a| {
        Ok(a.iter().max_by(|x, y| x.compare(y)).cloned().unwrap_or_default().unbound())
    });

    // rand(n): uniform in [0, n).
    register_eager(interp, "rand", Arity::Fixed(1), |interp, a| {
        Ok(Value::number(interp.next_random() * a[0].to_number("rand")?))
    });
}

// ── Strings ───────────────────────────────────────────────────────────────────

fn install_strings(interp: &mut Interpreter) {
    register_eager(interp, "upper", Arity::Fixed(1), |_, a| Ok(Value::string(a[0].to_string().to_uppercase())));
    register_eager(interp, "lower", Arity::Fixed(1), |_, a| Ok(Value::string(a[0].to_string().to_lowercase())));

    // replace(text, regex, replacement?): all matches.
    register_eager(interp, "replace", Arity::AtLeast(2), |interp, a| {
        if a.len() > 3 {
            return Err(too_many("replace", 3, a.len()));
        }
        let re = interp.regex(&a[1].to_string())?;
        let with = a.get(2).map(Value::to_string).unwrap_or_default();
        Ok(Value::string(re.replace_all(&a[0].to_string(), with.as_str()).into_owned()))
    });
}

// ── Constants ─────────────────────────────────────────────────────────────────

fn install_constants(interp: &mut Interpreter) {
    interp.register_global("null", Value::null());
    interp.register_global("true", Value::boolean(true));
    interp.register_global("false", Value::boolean(false));
    interp.register_global("pi", Value::number(std::f64::consts::PI));
    interp.register_global("euler", Value::number(std::f64::consts::E));
    for axis in ["_x", "_y", "_z"] {
        interp.register_global(axis, Value::number(0.0));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
