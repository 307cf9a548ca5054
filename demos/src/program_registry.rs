use slopos_abi::task::TASK_FLAG_USER_MODE;

#[derive(Clone, Copy)]
pub struct ProgramSpec {
    pub name: &'static [u8],
    pub path: &'static [u8],
    pub priority: u8,
    pub flags: u16,
    pub desc: &'static [u8],
}

const PROGRAM_REGISTRY: &[ProgramSpec] = &[
    ProgramSpec {
        name: b"init",
        path: b"/sbin/init",
        priority: 5,
        flags: TASK_FLAG_USER_MODE,
        desc: b"",
    },
    ProgramSpec {
        name: b"shell",
        path: b"/bin/shell",
        priority: 5,
        flags: TASK_FLAG_USER_MODE,
        desc: b"",
    },
    #[cfg(feature = "testbins")]
    ProgramSpec {
        name: b"fork_test",
        path: b"/bin/fork_test",
        priority: 5,
        flags: TASK_FLAG_USER_MODE,
        desc: b"",
    },
];

fn trim_nul_bytes(bytes: &[u8]) -> &[u8] {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..len]
}

pub fn resolve_program(name: &[u8]) -> Option<&'static ProgramSpec> {
    let requested = trim_nul_bytes(name);
    PROGRAM_REGISTRY
        .iter()
        .find(|spec| trim_nul_bytes(spec.name) == requested)
}

pub fn resolve_program_path(path: &[u8]) -> Option<&'static ProgramSpec> {
    let requested = trim_nul_bytes(path);
    PROGRAM_REGISTRY
        .iter()
        .find(|spec| trim_nul_bytes(spec.path) == requested)
}
