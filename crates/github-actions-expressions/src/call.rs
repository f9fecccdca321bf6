//! Worst-case evaluation of GitHub Actions expression functions.

use crate::{EvalError, Evaluation, Function};

/// Evaluates a call to `func` with already-evaluated arguments.
pub(crate) fn dispatch(func: &Function<'_>, args: Vec<Evaluation>) -> Result<Evaluation, EvalError> {
    match func {
        f if f == "contains" => contains(func, args),
        f if f == "startsWith" || f == "endsWith" => affix(func, args),
        f if f == "fromJSON" => from_json(func, args),
        f if f == "toJSON" => to_json(func, args),
        f if f == "format" => format(func, args),
        // Status checks: the job always gets this far in the worst case.
        f if f == "success" || f == "always" || f == "failure" => {
            arity(func, &args, 0, 0, "0")?;
            Ok(Evaluation::Boolean(true))
        }
        f if f == "cancelled" => {
            arity(func, &args, 0, 0, "0")?;
            Ok(Evaluation::Boolean(false))
        }
        _ => Err(EvalError::NotImplemented(format!("{}()", func.as_str()))),
    }
}

fn arity(
    func: &Function<'_>,
    args: &[Evaluation],
    min: usize,
    max: usize,
    expected: &'static str,
) -> Result<(), EvalError> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else {
        Err(EvalError::Arity {
            func: func.as_str().into(),
            expected,
            actual: args.len(),
        })
    }
}

/// `contains(search, item)`
///
/// See: <https://docs.github.com/en/actions/learn-github-actions/expressions#contains>
fn contains(func: &Function<'_>, args: Vec<Evaluation>) -> Result<Evaluation, EvalError> {
    arity(func, &args, 2, 2, "2")?;
    let [search, item]: [Evaluation; 2] = args
        .try_into()
        .map_err(|_| EvalError::NotImplemented(func.as_str().into()))?;

    Ok(Evaluation::Boolean(could_contain(&search, &item)))
}

fn could_contain(search: &Evaluation, item: &Evaluation) -> bool {
    match (search, item) {
        (Evaluation::Wildcard(_), _) => true,
        (Evaluation::Flexible(flex), item) => flex.options.iter().any(|o| could_contain(o, item)),
        (Evaluation::List(items), item) => items.iter().any(|i| i.could_equal(item)),
        (Evaluation::Object(_), _) => false,
        (Evaluation::Boolean(_), _) => false,
        (_, Evaluation::Wildcard(_)) => true,
        (search, Evaluation::Flexible(flex)) => flex.options.iter().any(|o| could_contain(search, o)),
        (search, item) => search
            .to_string()
            .to_lowercase()
            .contains(&item.to_string().to_lowercase()),
    }
}

/// `startsWith(search, affix)` and `endsWith(search, affix)`.
///
/// Concrete strings are checked for real; anything else falls back to
/// equality.
fn affix(func: &Function<'_>, args: Vec<Evaluation>) -> Result<Evaluation, EvalError> {
    arity(func, &args, 2, 2, "2")?;

    let result = match (&args[0], &args[1]) {
        (Evaluation::String(search), Evaluation::String(affix)) => {
            let search = search.to_lowercase();
            let affix = affix.to_lowercase();
            if func == "startsWith" {
                search.starts_with(&affix)
            } else {
                search.ends_with(&affix)
            }
        }
        (search, affix) => search.could_equal(affix),
    };

    Ok(Evaluation::Boolean(result))
}

/// `fromJSON(value)`
///
/// Strings that aren't valid JSON are returned unchanged.
fn from_json(func: &Function<'_>, mut args: Vec<Evaluation>) -> Result<Evaluation, EvalError> {
    arity(func, &args, 1, 1, "1")?;

    match args.remove(0) {
        Evaluation::String(s) => Ok(serde_json::from_str::<serde_json::Value>(&s)
            .map(Evaluation::from)
            .unwrap_or(Evaluation::String(s))),
        other => Ok(other),
    }
}

/// `toJSON(value)`
fn to_json(func: &Function<'_>, mut args: Vec<Evaluation>) -> Result<Evaluation, EvalError> {
    arity(func, &args, 1, 1, "1")?;
    Ok(args.remove(0))
}

/// `format(template, args...)`
///
/// The result is the first substituted argument, which is what an
/// attacker would aim to control. Without arguments, the template itself.
fn format(func: &Function<'_>, mut args: Vec<Evaluation>) -> Result<Evaluation, EvalError> {
    arity(func, &args, 1, usize::MAX, "at least 1")?;

    match args.len() {
        1 => Ok(args.remove(0)),
        _ => Ok(args.swap_remove(1)),
    }
}
