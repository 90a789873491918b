//! Claims a standalone django-ninja API as one family: every
//! `x = NinjaAPI(...)` instance and the functions registered on it with
//! `@x.get(...)` and friends all go to the api module.

use tracing::debug;

use crate::classify::claims::ClaimOutcome;
use crate::classify::target::{Role, TargetFile};
use crate::plugin::{Checkpoint, ConvertPlugin, HookContext, HookResult};
use crate::program::{DeclId, DeclKind};

pub const NAME: &str = "django_ninja";

pub fn load() -> Box<dyn ConvertPlugin> {
    Box::new(NinjaFamily)
}

pub struct NinjaFamily;

impl ConvertPlugin for NinjaFamily {
    fn name(&self) -> &str {
        NAME
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint::Views
    }

    fn run(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let toolkit = ctx.config().api_toolkit.clone();
        let (instances, endpoints) = {
            let view = ctx.rule_context();
            let instances: Vec<(DeclId, String)> = view
                .program
                .declarations
                .iter()
                .filter(|d| d.kind == DeclKind::Assignment && d.names.len() == 1)
                .filter(|d| {
                    d.call
                        .as_ref()
                        .and_then(|c| c.callee.as_deref())
                        .is_some_and(|callee| view.qualify(callee) == toolkit)
                })
                .map(|d| (d.id, d.names[0].clone()))
                .collect();

            let endpoints: Vec<DeclId> = view
                .program
                .declarations
                .iter()
                .filter(|d| matches!(d.kind, DeclKind::Function | DeclKind::Class))
                .filter(|d| {
                    d.decorators
                        .iter()
                        .filter_map(|dec| dec.path.as_deref())
                        .filter_map(|path| path.split_once('.'))
                        .any(|(root, _)| instances.iter().any(|(_, name)| name == root))
                })
                .map(|d| d.id)
                .collect();
            (instances, endpoints)
        };

        for (id, name) in &instances {
            match ctx.claim(*id, Role::ApiEndpoint, TargetFile::Api) {
                ClaimOutcome::Claimed => debug!(instance = %name, "claimed api instance"),
                ClaimOutcome::AlreadyClaimed { target, .. } => {
                    debug!(instance = %name, owner = %target, "api instance owned elsewhere");
                    ctx.require(TargetFile::Api, *id);
                }
                ClaimOutcome::NotRelocatable(_) => {}
            }
        }
        for id in endpoints {
            ctx.claim(id, Role::ApiEndpoint, TargetFile::Api);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::claims::{ClaimTable, Claimant};
    use crate::classify::Stage;
    use crate::config::ConvertConfig;
    use crate::graph::ReferenceGraph;
    use crate::plugin::PluginRegistry;
    use crate::program::ProgramModel;

    const SRC: &str = "\
from ninja import NinjaAPI

api = NinjaAPI()

@api.get(\"/add\")
def add(request, a: int, b: int):
    return {\"result\": a + b}

def helper():
    return 1
";

    fn run(claims: &mut ClaimTable, program: &ProgramModel) {
        let registry = PluginRegistry::builder().entry_points(false).plugin(NinjaFamily).build();
        let graph = ReferenceGraph::build(program);
        let config = ConvertConfig::default();
        registry
            .run_checkpoint(Checkpoint::Views, program, &graph, &config, None, claims)
            .unwrap();
    }

    #[test]
    fn test_claims_instance_and_endpoints() {
        let program = ProgramModel::parse(SRC).unwrap();
        let mut claims = ClaimTable::new(program.len());
        run(&mut claims, &program);
        for name in ["api", "add"] {
            let id = program.find(name).unwrap().id;
            assert_eq!(claims.owner(id), Some(TargetFile::Api));
            assert_eq!(claims.role(id), Role::ApiEndpoint);
        }
        assert!(!claims.is_claimed(program.find("helper").unwrap().id));
    }

    #[test]
    fn test_instance_claimed_elsewhere_is_required() {
        let program = ProgramModel::parse(SRC).unwrap();
        let mut claims = ClaimTable::new(program.len());
        let api = program.find("api").unwrap();
        claims.claim(api, Role::View, TargetFile::Views, Claimant::Stage(Stage::Views), None);
        run(&mut claims, &program);
        assert_eq!(claims.owner(api.id), Some(TargetFile::Views));
        assert_eq!(claims.requirements().len(), 1);
        assert_eq!(claims.requirements()[0].target, TargetFile::Api);
    }

    #[test]
    fn test_unrelated_instances_are_ignored() {
        let program = ProgramModel::parse("from other import NinjaAPI\napi = NinjaAPI()\n").unwrap();
        let mut claims = ClaimTable::new(program.len());
        run(&mut claims, &program);
        assert!(!claims.is_claimed(0));
    }
}
