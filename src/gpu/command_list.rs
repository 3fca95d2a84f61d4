use super::{BufferId, CommandAllocatorId, TextureId};

/// The draw passes of a frame, in the only order they are ever recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    Opaque,
    Wireframe,
    Sky,
    Transparent,
}

impl PassKind {
    /// Name of the pipeline state object the pipeline provider registers for this pass.
    pub fn pipeline_name(&self) -> &'static str {
        match self {
            PassKind::Opaque => "opaque",
            PassKind::Wireframe => "wireframe",
            PassKind::Sky => "sky",
            PassKind::Transparent => "water",
        }
    }
}

/// Root binding slots for constant data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantSlot {
    Object,
    Material,
    Pass,
    Water,
    Terrain,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginPass(PassKind),
    BindConstants {
        slot: ConstantSlot,
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
    BindTexture {
        /// Index into the shader-visible descriptor table.
        descriptor: u32,
        texture: TextureId,
    },
    BindVertexBuffer {
        buffer: BufferId,
        stride: u32,
    },
    BindIndexBuffer {
        buffer: BufferId,
    },
    DrawIndexed {
        index_count: u32,
        start_index: u32,
        base_vertex: i32,
    },
    EndPass,
}

/// A CPU-side recording of one frame's work, tied to the allocator that backs it.
#[derive(Debug, Clone)]
pub struct CommandList {
    allocator: CommandAllocatorId,
    commands: Vec<Command>,
}

impl CommandList {
    pub fn new(allocator: CommandAllocatorId) -> Self {
        Self {
            allocator,
            commands: Vec::new(),
        }
    }

    pub fn allocator(&self) -> CommandAllocatorId {
        self.allocator
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Every buffer the recording reads from.
    pub fn referenced_buffers(&self) -> impl Iterator<Item = BufferId> + '_ {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::BindConstants { buffer, .. } => Some(*buffer),
            Command::BindVertexBuffer { buffer, .. } => Some(*buffer),
            Command::BindIndexBuffer { buffer } => Some(*buffer),
            _ => None,
        })
    }

    pub fn referenced_textures(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::BindTexture { texture, .. } => Some(*texture),
            _ => None,
        })
    }

    /// The passes in recording order.
    pub fn passes(&self) -> Vec<PassKind> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::BeginPass(kind) => Some(*kind),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, Command::DrawIndexed { .. }))
            .count()
    }
}
