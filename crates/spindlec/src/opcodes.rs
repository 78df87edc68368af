use std::fmt;

/// Set on the first word of machine-level instructions (frame and control ops).
pub const MACHINE_MASK: i32 = 1024;
pub const ARG_SHIFT: u32 = 8;
pub const TYPE_MASK: i32 = 0xff;
pub const OPERAND_LEN_MASK: i32 = 0b11_0000_0000;
/// Largest raw operand a single instruction word can carry.
pub const MAX_OPERAND: i32 = 0xffff;

macro_rules! opcodes {
    ($($name:ident = $value:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Op {
            $($name = $value,)*
        }

        impl Op {
            pub fn from_u8(value: u8) -> Option<Op> {
                match value {
                    $($value => Some(Op::$name),)*
                    _ => None,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Op::$name => stringify!($name),)*
                }
            }
        }
    };
}

opcodes! {
    PushFrame = 0,
    PopFrame = 1,
    InvokeVirtual = 2,
    InvokeStatic = 3,
    Jump = 4,
    Return = 5,
    ReturnTo = 6,
    Helper = 16,
    SetNamedVariables = 17,
    SetBlocks = 18,
    SetVariable = 19,
    SetAotBlock = 20,
    SetJitBlock = 21,
    GetVariable = 22,
    GetProperty = 23,
    GetBlock = 24,
    JitSpreadBlock = 25,
    HasBlock = 26,
    HasBlockParams = 27,
    Concat = 28,
    Constant = 29,
    Primitive = 30,
    PrimitiveReference = 31,
    ReifyU32 = 32,
    Dup = 33,
    Pop = 34,
    Load = 35,
    Fetch = 36,
    RootScope = 37,
    VirtualRootScope = 38,
    ChildScope = 39,
    PopScope = 40,
    Text = 41,
    Comment = 42,
    AppendHTML = 43,
    AppendSafeHTML = 44,
    AppendDocumentFragment = 45,
    AppendNode = 46,
    AppendText = 47,
    OpenElement = 48,
    OpenDynamicElement = 49,
    PushRemoteElement = 50,
    StaticAttr = 51,
    DynamicAttr = 52,
    ComponentAttr = 53,
    FlushElement = 54,
    CloseElement = 55,
    PopRemoteElement = 56,
    Modifier = 57,
    BindDynamicScope = 58,
    PushDynamicScope = 59,
    PopDynamicScope = 60,
    CompileBlock = 61,
    PushBlockScope = 62,
    PushSymbolTable = 63,
    InvokeYield = 64,
    JumpIf = 65,
    JumpUnless = 66,
    JumpEq = 67,
    AssertSame = 68,
    Enter = 69,
    Exit = 70,
    ToBoolean = 71,
    EnterList = 72,
    ExitList = 73,
    PutIterator = 74,
    Iterate = 75,
    Main = 76,
    ContentType = 78,
    CurryComponent = 79,
    PushComponentDefinition = 80,
    PushDynamicComponentInstance = 81,
    PushCurriedComponent = 82,
    ResolveDynamicComponent = 83,
    PushArgs = 84,
    PushEmptyArgs = 85,
    PrepareArgs = 87,
    CaptureArgs = 88,
    CreateComponent = 89,
    RegisterComponentDestructor = 90,
    PutComponentOperations = 91,
    GetComponentSelf = 92,
    GetComponentTagName = 93,
    GetAotComponentLayout = 94,
    GetJitComponentLayout = 95,
    SetupForEval = 97,
    PopulateLayout = 98,
    InvokeComponentLayout = 99,
    BeginComponentTransaction = 100,
    CommitComponentTransaction = 101,
    DidCreateElement = 102,
    DidRenderLayout = 103,
    InvokePartial = 104,
    ResolveMaybeLocal = 105,
    Debugger = 106,
    StaticComponentAttr = 108,
}

impl Op {
    /// Machine ops drive frames and control flow and carry [`MACHINE_MASK`].
    pub fn is_machine(self) -> bool {
        (self as u8) <= 15
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// VM registers addressable from instruction operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Pc = 0,
    Ra = 1,
    Fp = 2,
    Sp = 3,
    S0 = 4,
    S1 = 5,
    T0 = 6,
    T1 = 7,
    V0 = 8,
}

/// Runtime classification of an appended value, dispatched on by the append routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Component = 0,
    String = 1,
    Empty = 2,
    SafeString = 3,
    Fragment = 4,
    Node = 5,
    Other = 6,
}

/// First word of an encoded instruction.
pub fn instruction_header(op: Op, operand_count: usize) -> i32 {
    let machine = if op.is_machine() { MACHINE_MASK } else { 0 };
    (op as i32) | machine | ((operand_count as i32) << ARG_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_packs_type_machine_bit_and_operand_count() {
        let word = instruction_header(Op::Return, 0);
        assert_eq!(word & TYPE_MASK, 5);
        assert_eq!(word & MACHINE_MASK, MACHINE_MASK);

        let word = instruction_header(Op::StaticAttr, 3);
        assert_eq!(word & TYPE_MASK, Op::StaticAttr as i32);
        assert_eq!(word & MACHINE_MASK, 0);
        assert_eq!((word & OPERAND_LEN_MASK) >> ARG_SHIFT, 3);
    }

    #[test]
    fn numbering_round_trips_through_from_u8() {
        for raw in 0..=u8::MAX {
            if let Some(op) = Op::from_u8(raw) {
                assert_eq!(op as u8, raw, "{op}");
            }
        }
        assert_eq!(Op::from_u8(77), None);
    }
}
