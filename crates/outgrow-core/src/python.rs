//! Python extension module `outgrow_core`, built with the `python` feature.

use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::config::ConvertConfig;
use crate::converter::Converter;
use crate::errors::OutgrowError;

/// Convert source text; returns `{"files": {path: text}, "report": json}`.
#[pyfunction]
#[pyo3(signature = (source, project_name="project", app_name="app"))]
fn convert_source(
    py: Python<'_>,
    source: &str,
    project_name: &str,
    app_name: &str,
) -> PyResult<PyObject> {
    let converter = Converter::new(ConvertConfig::new(project_name, app_name))?;
    let output = converter.convert_source(source)?;

    let files = PyDict::new(py);
    for file in &output.files {
        files.set_item(file.path.to_string_lossy().replace('\\', "/"), &file.contents)?;
    }
    let report = output.report.to_json().map_err(OutgrowError::from)?;

    let result = PyDict::new(py);
    result.set_item("files", files)?;
    result.set_item("report", report)?;
    result.set_item("app_instance", output.app_instance)?;
    Ok(result.into())
}

#[pymodule]
fn outgrow_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(convert_source, m)?)?;
    Ok(())
}
