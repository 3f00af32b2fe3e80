use super::BackendPrompt;
use super::ModelKind;

pub enum Action {
    Abort(),
    Generate(BackendPrompt),
    ListModels(Option<ModelKind>),
    RefreshBalance(),
}
