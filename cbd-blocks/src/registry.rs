use crate::blocks::*;
use crate::composites::{add_one, derivator, integrator};
use cbd_core::errors::{CbdError, CbdResult};
use cbd_core::registry::{BlockRegistry, BlockSpec};

fn count(spec: &BlockSpec, name: &str, default: i64) -> CbdResult<usize> {
    let value = spec.integer_or(name, default)?;
    usize::try_from(value)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            CbdError::Config(format!(
                "parameter {} of block {} must be a positive integer",
                name, spec.name
            ))
        })
}

fn log_level(spec: &BlockSpec) -> CbdResult<LogLevel> {
    match spec.parameters.get("level") {
        None => Ok(LogLevel::default()),
        Some(_) => match spec.string("level")?.as_str() {
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(CbdError::Config(format!("unknown log level {}", other))),
        },
    }
}

/// A registry with every block of this crate, keyed by its snake_case type name.
///
/// Variadic blocks read their port count from `num_inputs` (or `num_outputs`).
pub fn standard_registry() -> BlockRegistry {
    let mut registry = BlockRegistry::new();
    registry
        .register("constant", |spec| {
            Ok(Box::new(Constant::new(spec.float_or("value", 0.0)?)))
        })
        .register("gain", |spec| Ok(Box::new(Gain::new(spec.float("gain")?))))
        .register("negator", |_| Ok(Box::new(Negator)))
        .register("inverter", |spec| {
            Ok(Box::new(Inverter::new(spec.float_or("tolerance", 1e-30)?)))
        })
        .register("adder", |spec| {
            Ok(Box::new(Adder::new(count(spec, "num_inputs", 2)?)))
        })
        .register("product", |spec| {
            Ok(Box::new(Product::new(count(spec, "num_inputs", 2)?)))
        })
        .register("modulo", |_| Ok(Box::new(Modulo)))
        .register("root", |spec| {
            Ok(Box::new(Root::new(spec.float_or("tolerance", 1e-30)?)))
        })
        .register("power", |_| Ok(Box::new(Power)))
        .register("abs", |_| Ok(Box::new(Abs)))
        .register("int", |_| Ok(Box::new(Int)))
        .register("clamp", |spec| {
            Ok(Box::new(Clamp::from_parameters(ClampParameters {
                min: spec.float_or("min", -1.0)?,
                max: spec.float_or("max", 1.0)?,
                from_inputs: spec.bool_or("from_inputs", false)?,
            })))
        })
        .register("generic", |spec| {
            let function: UnaryFunction = spec.string("function")?.parse()?;
            Ok(Box::new(Generic::new(function)))
        })
        .register("multiplexer", |spec| {
            Ok(Box::new(Multiplexer::new(
                count(spec, "num_inputs", 2)?,
                spec.bool_or("zero_based", true)?,
            )))
        })
        .register("min", |spec| {
            Ok(Box::new(Min::new(count(spec, "num_inputs", 2)?)))
        })
        .register("max", |spec| {
            Ok(Box::new(Max::new(count(spec, "num_inputs", 2)?)))
        })
        .register("split", |spec| {
            Ok(Box::new(Split::new(count(spec, "num_outputs", 2)?)))
        })
        .register("less_than", |_| Ok(Box::new(LessThan)))
        .register("less_than_or_equals", |_| Ok(Box::new(LessThanOrEquals)))
        .register("equals", |_| Ok(Box::new(Equals)))
        .register("not", |_| Ok(Box::new(Not)))
        .register("or", |spec| {
            Ok(Box::new(Or::new(count(spec, "num_inputs", 2)?)))
        })
        .register("and", |spec| {
            Ok(Box::new(And::new(count(spec, "num_inputs", 2)?)))
        })
        .register("delay", |_| Ok(Box::new(Delay)))
        .register("delta_t", |spec| {
            Ok(Box::new(DeltaT::new(spec.float_or("min", 0.0)?)))
        })
        .register("time", |_| Ok(Box::new(Time)))
        .register("sequence", |spec| {
            Ok(Box::new(Sequence::new(spec.floats("values")?)?))
        })
        .register("logging", |spec| {
            Ok(Box::new(Logging::new(
                &spec.string("message")?,
                log_level(spec)?,
            )))
        })
        .register("add_one", |spec| Ok(Box::new(add_one(&spec.name)?)))
        .register("integrator", |spec| Ok(Box::new(integrator(&spec.name)?)))
        .register("derivator", |spec| Ok(Box::new(derivator(&spec.name)?)));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbd_core::registry::ModelDescription;
    use cbd_core::simulator::SimulatorBuilder;

    #[test]
    fn every_kind_is_registered() {
        let registry = standard_registry();
        for kind in [
            "constant",
            "gain",
            "adder",
            "clamp",
            "generic",
            "less_than_or_equals",
            "delay",
            "sequence",
            "logging",
            "integrator",
            "derivator",
            "add_one",
        ] {
            assert!(registry.contains(kind), "{} is not registered", kind);
        }
        assert_eq!(registry.kinds().len(), 31);
    }

    #[test]
    fn variadic_blocks_take_a_port_count() {
        let registry = standard_registry();
        let adder = registry
            .create(&BlockSpec::new("sum", "adder").with_parameter("num_inputs", 4))
            .unwrap();
        assert_eq!(adder.input_ports().len(), 4);

        let err = registry
            .create(&BlockSpec::new("sum", "adder").with_parameter("num_inputs", 0))
            .unwrap_err();
        assert!(err.to_string().contains("num_inputs"), "unexpected error: {}", err);
    }

    #[test]
    fn invalid_parameters_are_reported() {
        let registry = standard_registry();
        let err = registry
            .create(&BlockSpec::new("f", "generic").with_parameter("function", "gamma"))
            .unwrap_err();
        assert!(err.to_string().contains("gamma"), "unexpected error: {}", err);

        let err = registry
            .create(
                &BlockSpec::new("log", "logging")
                    .with_parameter("message", "hi")
                    .with_parameter("level", "loud"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("loud"), "unexpected error: {}", err);

        assert!(registry.create(&BlockSpec::new("g", "gain")).is_err());
    }

    #[test]
    fn lcg_from_a_description() {
        // x_{n+1} = (a * x_n + c) mod m with a = 1, c = 4, m = 9
        let description = ModelDescription::from_toml_str(
            r#"
name = "lcg"

[[blocks]]
name = "x0"
type = "constant"
parameters = { value = 0 }

[[blocks]]
name = "a"
type = "constant"
parameters = { value = 1 }

[[blocks]]
name = "c"
type = "constant"
parameters = { value = 4 }

[[blocks]]
name = "m"
type = "constant"
parameters = { value = 9 }

[[blocks]]
name = "delay"
type = "delay"

[[blocks]]
name = "mult"
type = "product"

[[blocks]]
name = "sum"
type = "adder"

[[blocks]]
name = "mod"
type = "modulo"

[[connections]]
from = "x0.OUT1"
to = "delay.IC"

[[connections]]
from = "delay.OUT1"
to = "mult.IN1"

[[connections]]
from = "a.OUT1"
to = "mult.IN2"

[[connections]]
from = "mult.OUT1"
to = "sum.IN1"

[[connections]]
from = "c.OUT1"
to = "sum.IN2"

[[connections]]
from = "sum.OUT1"
to = "mod.IN1"

[[connections]]
from = "m.OUT1"
to = "mod.IN2"

[[connections]]
from = "mod.OUT1"
to = "delay.IN1"
"#,
        )
        .unwrap();
        let graph = standard_registry().build(&description).unwrap();
        let mut sim = SimulatorBuilder::new(graph)
            .with_end_time(8.0)
            .build()
            .unwrap();
        sim.run().unwrap();

        assert_eq!(
            sim.values("delay", "OUT1").unwrap(),
            vec![0.0, 4.0, 8.0, 3.0, 7.0, 2.0, 6.0, 1.0, 5.0]
        );
    }
}
